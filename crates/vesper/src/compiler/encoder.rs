//! Instruction buffer for one block, with forward labels and the state of
//! the element being opened.

use crate::program::Op;
use crate::wire::Span;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct Label(usize);

pub(super) struct OpenElementState {
    pub tag: String,
    pub flushed: bool,
    pub span: Option<Span>,
}

#[derive(Default)]
pub(super) struct Encoder {
    words: Vec<u32>,
    labels: Vec<Option<u32>>,
    fixups: Vec<(usize, Label)>,
    pub elements: Vec<OpenElementState>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: Op, operands: &[u32]) {
        debug_assert_eq!(operands.len(), op.arity(), "{op} operand count");
        self.words.push(op.word());
        self.words.extend_from_slice(operands);
    }

    pub fn label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn mark(&mut self, label: Label) {
        self.labels[label.0] = Some(self.words.len() as u32);
    }

    pub fn jump(&mut self, op: Op, label: Label) {
        debug_assert!(matches!(op, Op::Jump | Op::JumpUnless));
        self.words.push(op.word());
        self.fixups.push((self.words.len(), label));
        self.words.push(0);
    }

    /// Emits `FlushElement` if an element's attributes are still open.
    pub fn flush(&mut self) {
        let pending = match self.elements.last_mut() {
            Some(element) if !element.flushed => {
                element.flushed = true;
                true
            }
            _ => false,
        };
        if pending {
            self.push(Op::FlushElement, &[]);
        }
    }

    pub fn accepts_attributes(&self) -> bool {
        self.elements.last().is_some_and(|element| !element.flushed)
    }

    /// Resolves jump targets to offsets from the block start.
    pub fn finish(mut self) -> Vec<u32> {
        let end = self.words.len() as u32;
        for (at, label) in std::mem::take(&mut self.fixups) {
            let target = self.labels[label.0];
            debug_assert!(target.is_some(), "label {label:?} never marked");
            self.words[at] = target.unwrap_or(end);
        }
        self.words
    }
}
