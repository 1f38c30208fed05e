//! JSON Patch accumulation
//!
//! Operations are kept in insertion order and serialized verbatim. Every path
//! handed to the builder must address the original, unmutated object.

use json_patch::{AddOperation, Patch, PatchOperation, ReplaceOperation};
use jsonptr::PointerBuf;
use serde_json::Value;

/// Ordered list of patch operations produced by a single mutator run
#[derive(Debug, Clone, Default)]
pub struct PatchBuilder {
    ops: Vec<PatchOperation>,
}

impl PatchBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an `add` operation
    pub fn add(&mut self, path: PointerBuf, value: Value) -> &mut Self {
        self.ops
            .push(PatchOperation::Add(AddOperation { path, value }));
        self
    }

    /// Append a `replace` operation
    pub fn replace(&mut self, path: PointerBuf, value: Value) -> &mut Self {
        self.ops
            .push(PatchOperation::Replace(ReplaceOperation { path, value }));
        self
    }

    /// Append every operation of `other`, preserving its order
    pub fn extend(&mut self, other: PatchBuilder) -> &mut Self {
        self.ops.extend(other.ops);
        self
    }

    /// Number of accumulated operations
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when no operation has been recorded
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Borrow the accumulated operations
    pub fn operations(&self) -> &[PatchOperation] {
        &self.ops
    }

    /// Serialize the operations to the JSON Patch wire format
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.ops)
    }

    /// Consume the builder into a `json_patch::Patch`
    pub fn into_patch(self) -> Patch {
        Patch(self.ops)
    }
}

/// Build a pointer from path segments, escaping `~` and `/` per RFC 6901
pub fn pointer<'a>(segments: impl IntoIterator<Item = &'a str>) -> PointerBuf {
    PointerBuf::from_tokens(segments)
}
