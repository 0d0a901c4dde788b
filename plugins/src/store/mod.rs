pub mod file;

pub use file::FileTaskStore;
