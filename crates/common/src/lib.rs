// casegate-common: capability model, secured query assembly and case view
// filtering shared by the casegate server and CLI.

pub mod acl;
pub mod catalog;
pub mod definition;
pub mod error;
pub mod query;
pub mod types;
pub mod view;
