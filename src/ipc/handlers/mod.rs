pub mod backup;
pub mod catalog;
pub mod core;
pub mod documents;
pub mod drafts;
pub mod students;
