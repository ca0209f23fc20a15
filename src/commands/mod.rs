pub mod extract;
pub mod inventory;
