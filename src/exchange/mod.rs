mod off;

pub use off::{load_mesh_file, save_mesh_file, to_off_string, OffDocument, OffError};
