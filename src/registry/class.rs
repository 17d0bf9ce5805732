//! Program-class data model (§3, §4.4): the configured description of a
//! known SmartWeb program type — its inputs, outputs, parameters, and
//! inheritance chain.

use crate::codec::ValueCodec;
use std::collections::BTreeMap;

/// Where a class document came from, for the USER-overrides-BUILTIN rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassSource {
    Builtin,
    User,
}

/// Display-type mapping target, used only to pick the broker control's
/// display type (§6); has no bearing on wire decoding.
pub type DisplayType = String;

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub id: u32,
    pub name: String,
    pub display_type: DisplayType,
    pub read_only: bool,
    pub codec: ValueCodec,
    /// Monotonic sort key assigned across inputs -> outputs -> parameters
    /// at load time, reproducing a stable UI ordering.
    pub order: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgramClass {
    pub program_type: u8,
    pub name: String,
    pub parent_class_names: Vec<String>,
    pub inputs: BTreeMap<u32, Field>,
    pub outputs: BTreeMap<u32, Field>,
    pub parameters: BTreeMap<u32, Field>,
    pub source: ClassSource,
}

/// The conventional root class every inheritance chain terminates at;
/// built-in classes declare `implements: ["PROGRAM"]` (or omit `implements`
/// entirely) and the registry does not look further.
pub const ROOT_CLASS_NAME: &str = "PROGRAM";
