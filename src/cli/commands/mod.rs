//! One module per subcommand.

pub mod add;
pub mod delete;
pub mod edit;
pub mod fields;
pub mod get;
pub mod init;
pub mod keygen;
pub mod ls;
