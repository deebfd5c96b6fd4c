//! Construction-time errors.
//!
//! Only building a layout or a packed tree can fail. Lookups and decodes never
//! return errors: an absent node, value or child is reported as `None`, an
//! empty chunk or `false`.

use thiserror::Error;

/// Errors raised while computing a layout, packing a tree or loading an image.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The requested bit budget does not fit the chosen node storage.
    #[error("invalid node width: {requested} bits requested, storage holds {capacity}")]
    InvalidNodeWidth {
        /// Requested bits per node.
        requested: u32,
        /// Bits the storage can hold per node.
        capacity: u32,
    },

    /// The computed field widths do not fit the bit budget.
    #[error("layout overflow: fields need {required} bits, budget is {budget}")]
    Overflow {
        /// Sum of the five field widths.
        required: u32,
        /// Available bits per node.
        budget: u32,
    },

    /// Too many nodes for the image's node-count field.
    #[error("too many nodes: {nodes} exceeds the limit of {max}")]
    NodesOverflow {
        /// Nodes in the analyzed tree.
        nodes: usize,
        /// Largest representable node count.
        max: usize,
    },

    /// The crammed chunk buffer is too long for the image's offset fields.
    #[error("chunk buffer too large: {len} bytes exceeds the limit of {max}")]
    ChunksOverflow {
        /// Length of the crammed buffer.
        len: usize,
        /// Largest representable buffer length.
        max: usize,
    },

    /// The image does not start with the expected magic bytes.
    #[error("not a packed radix tree image")]
    BadMagic,

    /// The image was written by an unknown format version.
    #[error("unsupported image version {0}")]
    UnsupportedVersion(u8),

    /// The image is shorter than its header claims.
    #[error("truncated image: need {needed} bytes, have {actual}")]
    Truncated {
        /// Bytes required by the header.
        needed: usize,
        /// Bytes supplied.
        actual: usize,
    },

    /// The image header is internally inconsistent.
    #[error("corrupt image: {0}")]
    Corrupt(&'static str),
}

/// Result type for construction and loading.
pub type Result<T> = std::result::Result<T, Error>;
