pub mod audit_trail;
pub mod confirmation;
pub mod connection_manager;
pub mod grid;
pub mod profiles;
pub mod row_editor;
pub mod schema;
pub mod session;
pub mod sql_generator;
