#![doc = include_str!("../README.md")]

mod action;
mod builder;
mod error;
mod formula;
mod graph;
mod logger;
mod namespace;
mod node;
mod op;
mod optimizer;
mod queue;
mod report;
mod slate;
mod value;

pub use action::Action;
pub use builder::FormulaBuilder;
pub use error::SlateError;
pub use formula::Formula;
pub use logger::{Logger, NoopLogger};
pub use node::{NodeId, NodeKind};
pub use op::OpKind;
pub use report::{Report, ReportEntry};
pub use slate::{Notification, Slate};
pub use value::{FromValue, Payload, PayloadType, Value, ValueType};
