//! Loads program-class documents from the built-in (compiled-in) directory
//! and a user-supplied directory, applying the override rules of §4.4.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use tracing::{info, warn};

use crate::codec::{EnumCodec, IntDivisorCodec, OnOffSensorCodec, OutputBitCodec, PwmCodec, SensorCodec, ValueCodec};
use crate::error::{ErrorExt, GatewayError, Result};
use crate::registry::class::{ClassSource, Field, ProgramClass};

#[derive(Debug, Deserialize)]
struct FieldDoc {
    id: u32,
    #[serde(rename = "type")]
    field_type: Option<String>,
    #[serde(rename = "readOnly")]
    read_only: Option<bool>,
    encoding: Option<String>,
    values: Option<BTreeMap<String, String>>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassDoc {
    #[serde(rename = "programType")]
    program_type: u8,
    class: String,
    #[serde(default)]
    implements: Vec<String>,
    #[serde(default)]
    inputs: Vec<FieldDoc>,
    #[serde(default)]
    outputs: Vec<FieldDoc>,
    #[serde(default)]
    parameters: Vec<FieldDoc>,
}

fn codec_for_encoding(encoding: &str, values: &Option<BTreeMap<String, String>>) -> Result<ValueCodec> {
    Ok(match encoding {
        "byte" => ValueCodec::IntDivisor(IntDivisorCodec { signed: true, width: 1, divisor: 1.0 }),
        "short" => ValueCodec::IntDivisor(IntDivisorCodec { signed: true, width: 2, divisor: 1.0 }),
        "short10" => ValueCodec::IntDivisor(IntDivisorCodec { signed: true, width: 2, divisor: 10.0 }),
        "short100" => ValueCodec::IntDivisor(IntDivisorCodec { signed: true, width: 2, divisor: 100.0 }),
        "ushort" => ValueCodec::IntDivisor(IntDivisorCodec { signed: false, width: 2, divisor: 1.0 }),
        "uint1K" => ValueCodec::IntDivisor(IntDivisorCodec { signed: false, width: 4, divisor: 1000.0 }),
        "uint60K" => ValueCodec::IntDivisor(IntDivisorCodec { signed: false, width: 4, divisor: 60000.0 }),
        "ubyte" => match values {
            Some(map) => {
                let mut enum_values = std::collections::BTreeMap::new();
                for (k, v) in map {
                    let byte: u8 = k
                        .parse()
                        .map_err(|_| GatewayError::config(format!("invalid ubyte enum key '{k}'")))?;
                    enum_values.insert(byte, v.clone());
                }
                ValueCodec::Enum(EnumCodec { values: enum_values })
            }
            None => ValueCodec::IntDivisor(IntDivisorCodec { signed: false, width: 1, divisor: 1.0 }),
        },
        other => return Err(GatewayError::config(format!("unknown encoding '{other}'"))),
    })
}

#[derive(Clone, Copy)]
enum Section {
    Input,
    Output,
    Parameter,
}

fn codec_for_field(section: Section, doc: &FieldDoc) -> Result<ValueCodec> {
    let field_type = doc.field_type.as_deref().unwrap_or("");
    let read_only = doc.read_only.unwrap_or(matches!(section, Section::Input | Section::Output));

    Ok(match section {
        Section::Input => {
            if field_type == "onOff" {
                ValueCodec::OnOffSensor(OnOffSensorCodec)
            } else {
                ValueCodec::Sensor(SensorCodec)
            }
        }
        Section::Output => {
            if field_type == "PWM" {
                ValueCodec::Pwm(PwmCodec)
            } else {
                ValueCodec::OutputBit(OutputBitCodec)
            }
        }
        Section::Parameter => {
            if field_type == "onOff" {
                ValueCodec::OnOffSensor(OnOffSensorCodec)
            } else if field_type == "temperature" && read_only {
                ValueCodec::Sensor(SensorCodec)
            } else if let Some(encoding) = &doc.encoding {
                codec_for_encoding(encoding, &doc.values)?
            } else {
                ValueCodec::default_parameter_codec()
            }
        }
    })
}

fn build_fields(section: Section, docs: Vec<FieldDoc>, order: &mut u32) -> Result<BTreeMap<u32, Field>> {
    let mut out = BTreeMap::new();
    for doc in docs {
        let codec = codec_for_field(section, &doc)?;
        let read_only = doc
            .read_only
            .unwrap_or(matches!(section, Section::Input | Section::Output));
        let name = doc.name.clone().unwrap_or_else(|| doc.id.to_string());
        let display_type = doc.field_type.clone().unwrap_or_default();
        let field = Field {
            id: doc.id,
            name,
            display_type,
            read_only,
            codec,
            order: *order,
        };
        *order += 1;
        out.insert(doc.id, field);
    }
    Ok(out)
}

fn parse_class(text: &str, source: ClassSource) -> Result<ProgramClass> {
    let doc: ClassDoc = serde_json::from_str(text)?;
    let mut order = 0u32;
    let inputs = build_fields(Section::Input, doc.inputs, &mut order)?;
    let outputs = build_fields(Section::Output, doc.outputs, &mut order)?;
    let parameters = build_fields(Section::Parameter, doc.parameters, &mut order)?;
    Ok(ProgramClass {
        program_type: doc.program_type,
        name: doc.class,
        parent_class_names: doc.implements,
        inputs,
        outputs,
        parameters,
        source,
    })
}

/// Merges builtin and user class documents, applying §4.4's override rules:
/// USER replaces BUILTIN on the same `programType` with a log message; USER
/// duplicates are rejected with a warning; BUILTIN arriving after a USER
/// class for the same type is ignored.
pub fn merge_classes(classes: Vec<ProgramClass>) -> std::collections::HashMap<u8, ProgramClass> {
    let mut by_type: std::collections::HashMap<u8, ProgramClass> = std::collections::HashMap::new();
    // The caller loads builtins first and appends user classes after, so
    // on a type collision it's always the (Builtin, User) arm below that
    // fires, which is what actually emits the required override log.
    for class in classes {
        match by_type.get(&class.program_type) {
            None => {
                by_type.insert(class.program_type, class);
            }
            Some(existing) => match (existing.source, class.source) {
                (ClassSource::User, ClassSource::User) => {
                    warn!(program_type = class.program_type, "duplicate USER class for programType, ignoring");
                }
                (ClassSource::Builtin, ClassSource::User) => {
                    info!(program_type = class.program_type, class = %class.name, "USER class overrides BUILTIN");
                    by_type.insert(class.program_type, class);
                }
                (ClassSource::User, ClassSource::Builtin) => {
                    // BUILTIN arriving after a USER class for the same type: ignored.
                }
                (ClassSource::Builtin, ClassSource::Builtin) => {
                    warn!(program_type = class.program_type, "duplicate BUILTIN class for programType, ignoring");
                }
            },
        }
    }
    by_type
}

/// Loads every `*.json` file in `dir` as a class document. A missing
/// directory is not an error — it simply contributes no classes.
pub fn load_user_directory(dir: &Path) -> Result<Vec<ProgramClass>> {
    let mut out = Vec::new();
    if !dir.is_dir() {
        return Ok(out);
    }
    let entries = std::fs::read_dir(dir).config_error("reading class directory")?;
    for entry in entries {
        let entry = entry.config_error("reading class directory entry")?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let text = std::fs::read_to_string(&path).config_error("reading class file")?;
        out.push(parse_class(&text, ClassSource::User)?);
    }
    Ok(out)
}

/// Built-in class documents compiled into the binary (§0.3): the gateway
/// ships usable classes without depending on an installed share directory.
pub fn load_builtin_classes() -> Result<Vec<ProgramClass>> {
    const BUILTIN_DOCS: &[&str] = &[include_str!("../../builtin_classes/room_device.json")];
    BUILTIN_DOCS
        .iter()
        .map(|text| parse_class(text, ClassSource::Builtin))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_d_class_decodes_from_builtin() {
        let classes = load_builtin_classes().unwrap();
        let room = classes.iter().find(|c| c.program_type == 5).expect("ROOM_DEVICE class");
        assert_eq!(room.name, "ROOM_DEVICE");
        let param = room.parameters.get(&2).expect("roomReducedTemperature");
        assert_eq!(param.name, "roomReducedTemperature");
        assert!(!param.read_only);
        let encoded = param.codec.encode("11.1").unwrap();
        assert_eq!(encoded, vec![0x6F, 0x00]);
    }

    #[test]
    fn user_class_overrides_builtin() {
        let builtin = parse_class(
            r#"{"programType":5,"class":"ROOM_DEVICE","inputs":[],"outputs":[],"parameters":[]}"#,
            ClassSource::Builtin,
        )
        .unwrap();
        let user = parse_class(
            r#"{"programType":5,"class":"ROOM_DEVICE_V2","inputs":[],"outputs":[],"parameters":[]}"#,
            ClassSource::User,
        )
        .unwrap();
        let merged = merge_classes(vec![builtin, user]);
        assert_eq!(merged.get(&5).unwrap().name, "ROOM_DEVICE_V2");
    }

    #[tracing_test::traced_test]
    #[test]
    fn user_override_of_builtin_is_logged() {
        let builtin = parse_class(
            r#"{"programType":5,"class":"ROOM_DEVICE","inputs":[],"outputs":[],"parameters":[]}"#,
            ClassSource::Builtin,
        )
        .unwrap();
        let user = parse_class(
            r#"{"programType":5,"class":"ROOM_DEVICE_V2","inputs":[],"outputs":[],"parameters":[]}"#,
            ClassSource::User,
        )
        .unwrap();
        merge_classes(vec![builtin, user]);
        assert!(tracing_test::logs_contain("USER class overrides BUILTIN"));
    }

    #[test]
    fn load_user_directory_reads_json_files_and_skips_others() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("extra.json"),
            r#"{"programType":9,"class":"EXTRA","inputs":[],"outputs":[],"parameters":[]}"#,
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a class document").unwrap();

        let classes = load_user_directory(dir.path()).unwrap();
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].name, "EXTRA");
    }

    #[test]
    fn load_user_directory_missing_dir_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        assert!(load_user_directory(&missing).unwrap().is_empty());
    }
}
