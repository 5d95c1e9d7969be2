pub mod descriptor;
pub mod reader;
pub mod sniff;

pub use descriptor::{CtParams, DxParams, ModalityParams, MrParams, RawDescriptor};
pub use reader::{read_descriptor, ReadOutcome};
pub use sniff::is_dicom_file;
