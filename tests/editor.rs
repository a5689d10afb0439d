use insnseq::edit::{
    AssemblyCompiler, Edit, Error, LoopContext, MethodScope, SequenceEditor, SequenceExpr,
    Toolchain,
};
use insnseq::finder::Match;
use insnseq::jvm::code::{CodeAttribute, ExceptionHandler};
use insnseq::jvm::model::MethodInfo;
use insnseq::jvm::MethodAccessFlags;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn method(max_stack: u16, max_locals: u16, code: Vec<u8>) -> MethodInfo {
    MethodInfo::new(
        "test",
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        CodeAttribute::new(max_stack, max_locals, code),
    )
}

fn same_field(candidate: &Match<'_>) -> bool {
    candidate.operand_u16(0) == candidate.operand_u16(1)
}

#[test]
fn same_field_updates_are_found() -> Result<(), Error> {
    init_logging();

    // aload_0, dup, getfield #7, putfield #7, aload_0, dup, getfield #7, putfield #9, return
    let code = vec![
        0x2a, 0x59, 0xb4, 0, 7, 0xb5, 0, 7, 0x2a, 0x59, 0xb4, 0, 7, 0xb5, 0, 9, 0xb1,
    ];
    let mut method = method(3, 1, code.clone());
    let editor = SequenceEditor::with_constraint("GETFIELD PUTFIELD", same_field)?;

    let mut seen = vec![];
    let edited = editor.instrument(&mut method, &mut Toolchain::default(), |expr| {
        let matched = expr.matched().expect("match is untouched");
        seen.push((expr.position(), matched.len(), matched.operand_u16(0)));
        Ok(())
    })?;

    // Looking without touching leaves the method exactly as it was
    assert!(!edited);
    assert_eq!(seen, vec![(2, 2, Some(7))]);
    assert_eq!(method.code, Some(CodeAttribute::new(3, 1, code)));
    Ok(())
}

#[test]
fn scan_resumes_after_shrinking_edit() -> Result<(), Error> {
    init_logging();

    // iload_0, (iconst_0 iadd) x2, nop, iconst_0, iadd, ireturn
    let code = vec![0x1a, 0x03, 0x60, 0x03, 0x60, 0x00, 0x03, 0x60, 0xac];
    let mut method = method(2, 1, code);
    let editor = SequenceEditor::new("iconst_0 iadd")?;

    let mut seen = vec![];
    let edited = editor.instrument(&mut method, &mut Toolchain::default(), |expr| {
        seen.push(expr.position());
        if seen.len() == 2 {
            expr.replace("")?;
        }
        Ok(())
    })?;

    assert!(edited);
    assert_eq!(seen, vec![1, 3, 4]);
    let attribute = method.code.unwrap();
    assert_eq!(attribute.code, vec![0x1a, 0x03, 0x60, 0x00, 0x03, 0x60, 0xac]);
    assert_eq!((attribute.max_stack, attribute.max_locals), (2, 1));
    Ok(())
}

#[test]
fn aliases_cover_operand_families() -> Result<(), Error> {
    init_logging();

    // iload 5, iconst_2, iadd, istore_1, iload_2, iconst_m1, iadd, bipush 9, iadd, ireturn
    let code = vec![
        0x15, 5, 0x05, 0x60, 0x3c, 0x1c, 0x02, 0x60, 0x10, 9, 0x60, 0xac,
    ];
    let mut method = method(2, 6, code);
    let editor = SequenceEditor::new("iload iconst iadd")?;

    let mut seen = vec![];
    editor.instrument(&mut method, &mut Toolchain::default(), |expr| {
        seen.push(expr.position());
        Ok(())
    })?;
    assert_eq!(seen, vec![0, 5]);
    Ok(())
}

#[test]
fn replacement_keeps_switch_aligned() -> Result<(), Error> {
    init_logging();

    // nop, iload_0, tableswitch { 0: 21, default: 20 }, return, return
    let code = vec![
        0x00, 0x1a, 0xaa, 0, 0, 0, 0, 18, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 19, 0xb1, 0xb1,
    ];
    let mut method = method(1, 1, code.clone());
    let editor = SequenceEditor::new("nop")?;

    let edited = editor.instrument(&mut method, &mut Toolchain::default(), |expr| {
        expr.replace("iconst_0; pop")
    })?;
    assert!(edited);

    // Growing by one byte would misalign the switch, so three more `nop`s follow
    let mut expected = vec![0x03, 0x57, 0x00, 0x00, 0x00];
    expected.extend_from_slice(&code[1..]);
    let attribute = method.code.unwrap();
    assert_eq!(attribute.code, expected);
    assert_eq!(attribute.max_stack, 2);
    Ok(())
}

#[test]
fn exception_ranges_follow_edits() -> Result<(), Error> {
    init_logging();

    // nop, iconst_1, pop, return, pop, return (with a handler covering 1..3 at 4)
    let mut attribute = CodeAttribute::new(1, 0, vec![0x00, 0x04, 0x57, 0xb1, 0x57, 0xb1]);
    attribute.exception_table.push(ExceptionHandler {
        start_pc: 1,
        end_pc: 3,
        handler_pc: 4,
        catch_type: 0,
    });
    let mut method = MethodInfo::new("guarded", MethodAccessFlags::STATIC, attribute);
    let editor = SequenceEditor::new("iconst_1 pop")?;

    editor.instrument(&mut method, &mut Toolchain::default(), |expr| {
        expr.replace("nop")
    })?;

    let attribute = method.code.unwrap();
    assert_eq!(attribute.code, vec![0x00, 0x00, 0xb1, 0x57, 0xb1]);
    assert_eq!(
        attribute.exception_table,
        vec![ExceptionHandler {
            start_pc: 1,
            end_pc: 2,
            handler_pc: 3,
            catch_type: 0,
        }]
    );
    Ok(())
}

/// Turns every matched `nop` into two of them
struct Doubler {
    calls: usize,
}

impl Edit for Doubler {
    fn edit(&mut self, expr: &mut SequenceExpr<'_, '_>) -> Result<(), Error> {
        self.calls += 1;
        expr.replace("nop; nop")
    }
}

#[test]
fn bounded_scan_tracks_edits() -> Result<(), Error> {
    init_logging();

    let mut attribute = CodeAttribute::new(0, 0, vec![0x00, 0x00, 0x00, 0xb1]);
    let editor = SequenceEditor::new("nop")?;
    let scope = MethodScope {
        name: "bounded",
        access_flags: MethodAccessFlags::STATIC,
    };
    let mut context = LoopContext::new(attribute.max_locals);
    let mut doubler = Doubler { calls: 0 };

    // Only the first two `nop`s are in range, and the range grows with each edit
    let mut iterator = attribute.iterator();
    let edited = editor.instrument_range(
        scope,
        &mut iterator,
        &mut context,
        2,
        &mut AssemblyCompiler,
        &mut doubler,
    )?;

    assert!(edited);
    assert_eq!(doubler.calls, 2);
    assert_eq!(iterator.code(), &[0x00, 0x00, 0x00, 0x00, 0x00, 0xb1][..]);
    assert_eq!(context, LoopContext::new(0));
    Ok(())
}

#[test]
fn locals_used_by_replacements_are_reserved() -> Result<(), Error> {
    init_logging();

    // iload_0, ireturn
    let mut method = method(1, 1, vec![0x1a, 0xac]);
    let editor = SequenceEditor::new("ireturn")?;

    editor.instrument(&mut method, &mut Toolchain::default(), |expr| {
        assert!(expr.within_static());
        expr.replace("istore 4; iload 4; iload 4; pop; ireturn")?;
        assert_eq!(expr.locals(), 5);
        Ok(())
    })?;

    let attribute = method.code.unwrap();
    assert_eq!(
        attribute.code,
        vec![0x1a, 0x36, 4, 0x15, 4, 0x15, 4, 0x57, 0xac]
    );
    assert_eq!((attribute.max_stack, attribute.max_locals), (2, 5));
    Ok(())
}
