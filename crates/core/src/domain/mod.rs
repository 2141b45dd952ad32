pub mod alert;
pub mod catalog;
