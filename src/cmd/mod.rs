pub mod chassis;
pub mod providers;
