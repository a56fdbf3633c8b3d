//! Record buffers: growable byte regions, paged output writers and the
//! matching fragment readers/cursors consumed on the input side.

pub mod cursor;
pub mod fragment;
pub mod reader;
pub mod region;
pub mod writer;

pub use cursor::InputCursor;
pub use fragment::{InputFragment, OutputFragment};
pub use reader::PageReader;
pub use region::ByteRegion;
pub use writer::{FragmentSink, PageWriter, WriterOptions};
