//! Extended listener patterns
//!
//! A pattern such as `"child.[left, right].value"` is parsed once into a
//! [`Pattern`] graph and shared through a process-wide cache. Simple name
//! lists are wired straight onto facets; anything with links or wildcards
//! becomes a [`ListenerBinding`] that follows the object graph and rebinds
//! when intermediate links are reassigned.

mod binding;
mod lexer;
pub mod parser;

pub(crate) use binding::ListenerBinding;
pub use parser::{is_simple_name, Pattern};
