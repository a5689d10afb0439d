//! Search for instruction sequences using regular expressions
//!
//! ### Encoding
//!
//! Matching sequences of instructions is just matching strings, as long as each instruction is
//! a character. [`InstructionIndex`] walks a method body once and records, for every
//! instruction, its byte range along with one character of the opcode [`alphabet`]. Patterns
//! are written with instruction names and then [translated](compile_pattern) into regexes over
//! the same alphabet, so a regex match over the encoded string is an instruction index range,
//! which maps back to byte offsets through the recorded boundaries.
//!
//! ### Aliases
//!
//! Besides plain mnemonics, patterns can use aliases for whole categories of instructions (eg.
//! `branchinstruction`, `loadinstruction`, or `instruction` for anything) and for families of
//! instructions that differ only in an inline operand (`iload` also matches `iload_0` through
//! `iload_3`).
//!
//! ### Staleness
//!
//! The finder works on a snapshot of the code. Once the code is modified, the snapshot must be
//! refreshed with [`InstructionFinder::reread`] before searching again.

pub mod alphabet;
mod errors;
mod index;
mod matcher;
mod pattern;

pub use errors::*;
pub use index::*;
pub use matcher::*;
pub use pattern::*;

/// Searches a snapshot of a method body
pub struct InstructionFinder {
    code: Vec<u8>,
    index: InstructionIndex,
}

impl InstructionFinder {
    pub fn new(code: &[u8]) -> Result<InstructionFinder, Error> {
        Ok(InstructionFinder {
            code: code.to_vec(),
            index: InstructionIndex::build(code)?,
        })
    }

    /// Refresh the snapshot after the code has been altered
    pub fn reread(&mut self, code: &[u8]) -> Result<(), Error> {
        self.index = InstructionIndex::build(code)?;
        self.code = code.to_vec();
        Ok(())
    }

    pub fn handles(&self) -> &[InstructionHandle] {
        self.index.handles()
    }

    pub fn encoded(&self) -> &str {
        self.index.encoded()
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// All matches, starting from the instruction `from`
    ///
    /// Fails if `from` is not one of the instructions of the snapshot.
    pub fn search<'a>(
        &'a self,
        pattern: &'a CompiledPattern,
        from: &InstructionHandle,
        constraint: Option<&'a dyn Constraint>,
    ) -> Result<Matches<'a>, Error> {
        let start = self
            .index
            .position_of(from.start())
            .filter(|idx| self.index.handles()[*idx] == *from)
            .ok_or(Error::OffsetNotFound(from.start()))?;
        Ok(self.matches_from(pattern, start, constraint))
    }

    /// All matches in the whole method body
    pub fn search_all<'a>(
        &'a self,
        pattern: &'a CompiledPattern,
        constraint: Option<&'a dyn Constraint>,
    ) -> Matches<'a> {
        self.matches_from(pattern, 0, constraint)
    }

    /// First accepted match at or after the instruction starting at byte offset `from`
    pub fn search_next<'a>(
        &'a self,
        pattern: &'a CompiledPattern,
        from: usize,
        constraint: Option<&'a dyn Constraint>,
    ) -> Result<Option<Match<'a>>, Error> {
        let start = self
            .index
            .position_of(from)
            .ok_or(Error::OffsetNotFound(from))?;
        Ok(self.matches_from(pattern, start, constraint).next())
    }

    fn matches_from<'a>(
        &'a self,
        pattern: &'a CompiledPattern,
        start: usize,
        constraint: Option<&'a dyn Constraint>,
    ) -> Matches<'a> {
        Matches::new(
            self.index.handles(),
            self.index.encoded(),
            &self.code,
            pattern,
            constraint,
            start,
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::Opcode;

    const GETFIELD_F: [u8; 3] = [0xb4, 0, 7];
    const PUTFIELD_F: [u8; 3] = [0xb5, 0, 7];
    const GETFIELD_G: [u8; 3] = [0xb4, 0, 9];
    const PUTFIELD_G: [u8; 3] = [0xb5, 0, 9];

    fn code(parts: &[&[u8]]) -> Vec<u8> {
        parts.concat()
    }

    fn same_field(candidate: &Match<'_>) -> bool {
        candidate.operand_u16(0) == candidate.operand_u16(1)
    }

    fn accept_all(_: &Match<'_>) -> bool {
        true
    }

    struct RejectAll;

    impl Constraint for RejectAll {
        fn check(&self, _: &Match<'_>) -> bool {
            false
        }
    }

    #[test]
    fn getfield_putfield() {
        let finder = InstructionFinder::new(&code(&[&GETFIELD_F, &PUTFIELD_F, &[0xb1]])).unwrap();
        let pattern = compile_pattern("GETFIELD PUTFIELD").unwrap();
        let matches: Vec<Match> = finder.search_all(&pattern, None).collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].len(), 2);
        assert_eq!(
            matches[0].opcodes().collect::<Vec<_>>(),
            vec![Opcode::GETFIELD, Opcode::PUTFIELD]
        );
        assert_eq!((matches[0].start(), matches[0].end()), (0, 6));
        assert_eq!(matches[0].byte_length(), 6);

        let apart = InstructionFinder::new(&code(&[&GETFIELD_F, &[0x00], &PUTFIELD_F])).unwrap();
        assert_eq!(apart.search_all(&pattern, None).count(), 0);
    }

    #[test]
    fn same_field_constraint() {
        let finder =
            InstructionFinder::new(&code(&[&GETFIELD_F, &PUTFIELD_F, &GETFIELD_G])).unwrap();
        let pattern = compile_pattern("getfield putfield").unwrap();
        let matches: Vec<Match> = finder.search_all(&pattern, Some(&same_field)).collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].index(), 0);
        assert_eq!(matches[0].bytes(1), Some(&PUTFIELD_F[..]));

        let mismatched =
            InstructionFinder::new(&code(&[&GETFIELD_F, &PUTFIELD_G, &GETFIELD_G, &PUTFIELD_G]))
                .unwrap();
        let matches: Vec<Match> = mismatched
            .search_all(&pattern, Some(&same_field))
            .collect();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].start(), 6);
    }

    #[test]
    fn constraint_filtering() {
        let finder = InstructionFinder::new(&code(&[
            &GETFIELD_F,
            &PUTFIELD_F,
            &[0x00],
            &GETFIELD_G,
            &PUTFIELD_G,
        ]))
        .unwrap();
        let pattern = compile_pattern("fieldinstruction+").unwrap();

        let unconstrained: Vec<usize> = finder
            .search_all(&pattern, None)
            .map(|m| m.start())
            .collect();
        let accepting: Vec<usize> = finder
            .search_all(&pattern, Some(&accept_all))
            .map(|m| m.start())
            .collect();
        assert_eq!(unconstrained, vec![0, 7]);
        assert_eq!(accepting, unconstrained);
        assert_eq!(finder.search_all(&pattern, Some(&RejectAll)).count(), 0);
    }

    #[test]
    fn rejected_candidate_does_not_block_later_match() {
        // The first pair reads one field and writes another
        let finder = InstructionFinder::new(&code(&[
            &GETFIELD_G,
            &PUTFIELD_F,
            &GETFIELD_F,
            &PUTFIELD_F,
        ]))
        .unwrap();
        let pattern = compile_pattern("getfield putfield").unwrap();
        let starts: Vec<usize> = finder
            .search_all(&pattern, Some(&same_field))
            .map(|m| m.start())
            .collect();
        assert_eq!(starts, vec![6]);
    }

    #[test]
    fn search_next_from_offset() {
        let finder = InstructionFinder::new(&code(&[
            &GETFIELD_F,
            &PUTFIELD_F,
            &GETFIELD_F,
            &PUTFIELD_F,
        ]))
        .unwrap();
        let pattern = compile_pattern("getfield putfield").unwrap();

        let first = finder.search_next(&pattern, 0, None).unwrap().unwrap();
        assert_eq!(first.start(), 0);
        let second = finder.search_next(&pattern, 3, None).unwrap().unwrap();
        assert_eq!(second.start(), 6);
        assert!(finder.search_next(&pattern, 9, None).unwrap().is_none());
        assert!(matches!(
            finder.search_next(&pattern, 1, None),
            Err(Error::OffsetNotFound(1))
        ));
    }

    #[test]
    fn search_from_handle() {
        let finder = InstructionFinder::new(&code(&[&GETFIELD_F, &PUTFIELD_F, &[0xb1]])).unwrap();
        let pattern = compile_pattern("instruction").unwrap();
        let from = finder.handles()[1];
        assert_eq!(finder.search(&pattern, &from, None).unwrap().count(), 2);

        let stranger = InstructionHandle::new(3, 4, Opcode::NOP);
        assert!(matches!(
            finder.search(&pattern, &stranger, None),
            Err(Error::OffsetNotFound(3))
        ));
    }

    #[test]
    fn empty_matches_are_skipped() {
        let finder = InstructionFinder::new(&[0x00, 0x57, 0x00]).unwrap();
        let pattern = compile_pattern("nop*").unwrap();
        let starts: Vec<usize> = finder
            .search_all(&pattern, None)
            .map(|m| m.start())
            .collect();
        assert_eq!(starts, vec![0, 2]);

        let empty = InstructionFinder::new(&[]).unwrap();
        assert_eq!(empty.search_all(&pattern, None).count(), 0);
    }

    #[test]
    fn reread_after_change() {
        let mut finder = InstructionFinder::new(&[0x00, 0xb1]).unwrap();
        let pattern = compile_pattern("pop").unwrap();
        assert_eq!(finder.search_all(&pattern, None).count(), 0);
        finder.reread(&[0x00, 0x57, 0xb1]).unwrap();
        assert_eq!(finder.search_all(&pattern, None).count(), 1);
        assert_eq!(finder.code(), &[0x00, 0x57, 0xb1][..]);
    }
}
