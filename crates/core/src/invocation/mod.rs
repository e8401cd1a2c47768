//! Turning raw caller input into a validated invocation context.
//!
//! [`parse::parse_invocation`] structures and deduplicates the raw
//! `key=value` arrays; [`validate::validate_invocation`] checks them against
//! the script definition and the token's access declaration.

pub mod parse;
pub mod type_check;
pub mod types;
pub mod validate;

pub use parse::parse_invocation;
pub use types::{
    AcceptedFile, EnvironmentVariable, ParsedFile, ParsedScriptInvocation, ParsedVariable,
    RawInvocation, ScriptArgument, ScriptInvocationContext, UploadedFile,
};
pub use validate::{validate_invocation, Grants};
