use std::collections::HashMap;
use std::ops::Range;
use std::sync::OnceLock;

use crate::abi::{SLOT_SIZE, VADDR_PROGRAM};
use crate::error::{LoadError, VerifyError};
use crate::loader::relocate;
use crate::sbf::Slot;
use crate::verifier;

/// A loaded, relocated SBF program.
///
/// Immutable once built. Share it between threads behind an `Arc` (or a plain
/// reference) and construct one interpreter per execution.
#[derive(Debug)]
pub struct Program {
    image: Vec<u8>,
    text: Range<usize>,
    entry_pc: u64,
    functions: HashMap<u32, u64>,
    sbf_v2: bool,
    verified: OnceLock<Result<(), VerifyError>>,
}

impl Program {
    pub(crate) fn new(
        image: Vec<u8>,
        text: Range<usize>,
        entry_pc: u64,
        functions: HashMap<u32, u64>,
        sbf_v2: bool,
    ) -> Self {
        Self {
            image,
            text,
            entry_pc,
            functions,
            sbf_v2,
            verified: OnceLock::new(),
        }
    }

    /// Builds a program from a bare `.text` image mapped at the start of the
    /// program region, with the entrypoint at slot 0.
    ///
    /// Relative calls are resolved the same way the ELF loader resolves them.
    pub fn from_text_bytes(text: &[u8]) -> Result<Self, LoadError> {
        if text.is_empty() || text.len() % SLOT_SIZE != 0 {
            return Err(LoadError::InvalidTextSize(text.len() as u64));
        }
        let mut image = text.to_vec();
        let mut functions = HashMap::new();
        let range = 0..image.len();
        relocate::resolve_calls(&mut image, range.clone(), &mut functions)?;
        Ok(Self::new(image, range, 0, functions, false))
    }

    /// The whole read-only image, mapped at `VADDR_PROGRAM`.
    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// The bytecode.
    #[must_use]
    pub fn text(&self) -> &[u8] {
        &self.image[self.text.clone()]
    }

    /// Virtual address of slot 0.
    #[must_use]
    pub fn text_vaddr(&self) -> u64 {
        VADDR_PROGRAM + self.text.start as u64
    }

    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.text.len() / SLOT_SIZE
    }

    #[must_use]
    pub fn slot(&self, pc: usize) -> Option<Slot> {
        Slot::read(self.text(), pc)
    }

    #[must_use]
    pub fn entry_pc(&self) -> u64 {
        self.entry_pc
    }

    /// Target slot of a local function call hash.
    #[must_use]
    pub fn function(&self, hash: u32) -> Option<u64> {
        self.functions.get(&hash).copied()
    }

    #[must_use]
    pub fn functions(&self) -> &HashMap<u32, u64> {
        &self.functions
    }

    #[must_use]
    pub fn is_sbf_v2(&self) -> bool {
        self.sbf_v2
    }

    /// Runs the static verifier. The outcome is computed once and cached.
    pub fn verify(&self) -> Result<(), VerifyError> {
        self.verified
            .get_or_init(|| verifier::verify(self.text()))
            .clone()
    }
}
