//! PDF writing.
//!
//! ```text
//! PdfDocument + changed/new objects
//!     ↓
//! [IncrementalUpdate] (append revision, or full rewrite)
//!     ↓
//! [ObjectSerializer] (serializes PDF objects)
//!     ↓
//! PDF bytes + RevisionLayout (object offsets)
//! ```

mod incremental;
mod object_serializer;

pub use incremental::{IncrementalUpdate, RevisionLayout};
pub use object_serializer::ObjectSerializer;
