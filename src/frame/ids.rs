//! Numeric protocol constants.
//!
//! Values marked "fixed by wire compatibility" are pinned by the literal
//! scenarios this gateway must reproduce byte-for-byte. The remaining
//! function ids are not pinned anywhere in the governing scenarios; they are
//! assigned following the originating driver's enum ordering and are safe to
//! change in lockstep with `builtin_classes/` if a real bus disagrees — see
//! the program-type/function-id note in `DESIGN.md`.

/// `program_type` values (identifier bits 0-7). The full
/// `E_ProgramType` enumeration from the originating driver's
/// `smart_web_conventions.h`, kept for wire-compatible classification of
/// controller/program traffic this gateway doesn't otherwise act on.
pub mod program_type {
    pub const UNDEFINED: u8 = 0;
    /// Header-level "this is a program, not a controller" type used during
    /// discovery. Not pinned by a literal scenario, but scenario E's class
    /// byte (5 = `PT_ROOM_DEVICE`) is only meaningful once discovery itself
    /// is correctly classified as `PT_PROGRAM`.
    pub const PROGRAM: u8 = 1;
    pub const OUTDOOR_SENSOR: u8 = 2;
    pub const CONSUMER: u8 = 3;
    pub const CASCADE_MANAGER: u8 = 4;
    pub const ROOM_DEVICE: u8 = 5;
    pub const TEMPERATURE_SOURCE: u8 = 6;
    pub const HEAT_ACCUMULATOR: u8 = 7;
    pub const EXTENDED_CONTROLLER: u8 = 8;
    pub const EXTENSION_CONTROLLER: u8 = 9;
    pub const MONITORING_DEVICE: u8 = 10;
    /// Fixed by wire compatibility (GET_CHANNEL_NUMBER / GET_PARAMETER_VALUE
    /// scenarios).
    pub const CONTROLLER: u8 = 11;
    pub const CIRCUIT: u8 = 12;
    pub const SCHEDULE: u8 = 13;
    pub const HEATING_CIRCUIT: u8 = 14;
    pub const DIRECT_CIRCUIT: u8 = 15;
    pub const DHW: u8 = 16;
    pub const FLOW_THROUGH_DHW: u8 = 17;
    pub const TEMPERATURE_GENERATOR: u8 = 18;
    pub const POOL: u8 = 19;
    pub const THERMOSTAT: u8 = 20;
    pub const SNOWMELT: u8 = 21;
    /// Fixed by wire compatibility (SET_PARAMETER_VALUE scenario).
    pub const REMOTE_CONTROL: u8 = 22;
    pub const BOILER: u8 = 23;
    pub const CHILLER: u8 = 24;
    pub const SOLAR_COLLECTOR: u8 = 25;
    pub const VENTILATION: u8 = 26;
    pub const GENERIC_RELAY: u8 = 27;
    pub const ALARM: u8 = 28;
}

/// `function_id` values in the `CONTROLLER` program-type group. The full
/// `Controller::Function::CANFunction` catalogue; only the ones this
/// gateway's request dispatch (§4.6) actually handles get call sites
/// elsewhere — everything else falls through to the `Unsupported` policy
/// (§7), but is named here so a response to e.g. `GET_RELAY_MAPPING` is
/// correctly classified rather than logged as an unrecognized raw number.
pub mod controller_fn {
    pub const I_AM_HERE: u8 = 1;
    pub const GET_CONTROLLER: u8 = 2;
    pub const GET_ACTIVE_PROGRAMS_LIST: u8 = 3;
    pub const ADD_NEW_PROGRAM: u8 = 4;
    pub const REMOVE_PROGRAM: u8 = 5;
    pub const GET_SYSTEM_DATE_TIME: u8 = 6;
    pub const SET_SYSTEM_DATE_TIME: u8 = 7;
    pub const GET_CONTROLLER_TYPE: u8 = 8;
    pub const GET_PROGRAM_VERSION: u8 = 9;
    /// Fixed by wire compatibility (scenario A).
    pub const GET_CHANNEL_NUMBER: u8 = 10;
    pub const GET_OUTPUT_TYPE: u8 = 11;
    pub const GET_INPUT_TYPE: u8 = 12;
    pub const GET_CHANNEL_BINDING: u8 = 13;
    pub const GET_INPUT_VALUE: u8 = 14;
    pub const SET_OUTPUT_VALUE: u8 = 15;
    pub const HAS_ERROR: u8 = 16;
    pub const GET_CONTROLLER_MASKS: u8 = 17;
    pub const GET_CHANNELS_INFO: u8 = 18;
    pub const GET_OUTPUT_VALUE: u8 = 19;
    pub const TIME_MASTER_IS_ACTIVE: u8 = 20;
    pub const JOURNAL: u8 = 21;
    pub const GET_VARIABLE: u8 = 22;
    pub const SET_VARIABLE: u8 = 23;
    pub const GET_RELAY_MAPPING: u8 = 24;
    pub const SET_RELAY_MAPPING: u8 = 25;
    pub const RESET_TO_DEFAULTS: u8 = 26;
    pub const RESET_PROGRAMS: u8 = 27;
}

/// `function_id` values in the `REMOTE_CONTROL` program-type group.
pub mod remote_control_fn {
    /// Fixed by wire compatibility (scenario B payload's embedded
    /// parameter_id and by the mapping-key example in the same scenario).
    pub const GET_PARAMETER_VALUE: u8 = 1;
    /// Fixed by wire compatibility (scenario D).
    pub const SET_PARAMETER_VALUE: u8 = 2;
    pub const GET_PARAMETER_NAME: u8 = 3;
    pub const GET_PARAMETER_DESCRIPTION: u8 = 4;
    pub const GET_PARAMETER_MINIMUM: u8 = 5;
    pub const GET_PARAMETER_MAXIMUM: u8 = 6;
    pub const GET_PARAMETER_DEFAULT: u8 = 7;
    pub const GET_PARAMETER_UNIT: u8 = 8;
}

/// `function_id` values in the `PROGRAM` program-type group.
pub mod program_fn {
    pub const IS_ID_OCCUPIED: u8 = 1;
    pub const IS_TYPE_SUPPORTED: u8 = 2;
    pub const GET_PROGRAM_TYPE: u8 = 3;
    pub const GET_PROGRAM_NAME: u8 = 4;
    pub const GET_PROGRAM_TYPES: u8 = 5;
    pub const GET_SMARTNET_PROTOCOL_VERSION: u8 = 6;
    pub const I_AM_PROGRAM: u8 = 7;
    pub const IS_COLLISION: u8 = 8;
}

/// `parameter_id` values used inside a `REMOTE_CONTROL/GET_PARAMETER_VALUE`
/// payload addressed at `PT_PROGRAM` to distinguish inputs from outputs.
pub mod program_parameter_id {
    /// Fixed by wire compatibility (scenario B: `parameter_id=SENSOR=1`).
    pub const SENSOR: u8 = 1;
    pub const OUTPUT: u8 = 2;
}

/// Controller hardware type byte reported in `I_AM_HERE` responses. This is
/// a distinct byte space from `program_type::EXTENDED_CONTROLLER` above (a
/// `E_ProgramType` enum value used for discovery classification) — the two
/// happen to share a name in the originating driver but not a value.
pub const EXTENDED_CONTROLLER_HW_TYPE: u8 = 14;

/// Sensor sentinel values (§3).
pub mod sensor_sentinel {
    pub const SHORT_CIRCUIT: i16 = -32768;
    pub const OPEN: i16 = -32767;
    pub const UNDEFINED: i16 = -32766;
}

/// The undefined-sensor wire value a `GET_PARAMETER_VALUE` response
/// substitutes when a mapping is absent or stale (scenario F: `0x8002`).
pub const SENSOR_UNDEFINED_WORD: u16 = 0x8002;
