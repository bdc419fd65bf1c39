//! Protocol definitions for the EPEver Tracer LS-B series solar charge
//! controller (LS-B Series Protocol ModBus Register Address List V1.1).
//!
//! Everything in this module is pure data handling: the register catalog,
//! strongly-typed snapshot and status types, and the decode/encode rules that
//! turn raw 16-bit register words into physical quantities. No I/O happens
//! here; the `tokio_sync`/`tokio_async` modules drive the wire transactions
//! and feed the raw blocks into these decoders.
//!
//! Scaling conventions on this device:
//! * voltages, currents, temperatures and state of charge are transferred as
//!   integers in hundredths (divide by 100),
//! * power and energy values exceeding 16-bit resolution are transferred as
//!   low/high register pairs, combined via [`combine_32bit`].

/// Errors that can occur while validating or decoding protocol values.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The device address is outside the valid Modbus RTU range.
    #[error("device address {0} out of range (1..=247)")]
    AddressOutOfRange(u8),

    /// A response block did not contain the expected number of values.
    ///
    /// With correct block-read quantities this cannot happen; it surfaces
    /// protocol bugs instead of silently producing partial snapshots.
    #[error("expected {expected} values from register {address:#06X}, got {actual}")]
    RegisterCountMismatch {
        address: u16,
        expected: u16,
        actual: usize,
    },

    /// The configured state of charge offset is outside the realtime block.
    #[error("state of charge offset {0:#04X} out of range (0x13..=0x1D)")]
    SocOffsetOutOfRange(u16),

    /// The battery type register holds an unknown code.
    #[error("unknown battery type code {0}")]
    InvalidBatteryType(u16),

    /// The battery status voltage bits hold a value with no defined meaning.
    #[error("invalid battery voltage status bits {0:#06X}")]
    InvalidBatteryVoltageStatus(u16),

    /// Nominal pack voltage below the 12 V base the thresholds are scaled from.
    #[error("nominal battery voltage {0} V is below the 12 V base")]
    NominalVoltageTooLow(u16),
}

fn check_count<T>(address: u16, expected: u16, values: &[T]) -> Result<(), Error> {
    if values.len() == usize::from(expected) {
        Ok(())
    } else {
        Err(Error::RegisterCountMismatch {
            address,
            expected,
            actual: values.len(),
        })
    }
}

/// Combines a low/high register pair into one physical value.
///
/// The integer combination happens first, then a single division by 100.
pub fn combine_32bit(low: u16, high: u16) -> f64 {
    f64::from(u32::from(high) << 16 | u32::from(low)) / 100.0
}

/// Scales a single raw register by `10^decimals`.
pub fn scale(raw: u16, decimals: u32) -> f64 {
    f64::from(raw) / 10f64.powi(decimals as i32)
}

fn centi(raw: u16) -> f64 {
    f64::from(raw) / 100.0
}

/// Modbus RTU device address (1 to 247).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Address(u8);

impl Address {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 247;
}

impl Default for Address {
    /// Factory default address of the Tracer controller.
    fn default() -> Self {
        Self(1)
    }
}

impl TryFrom<u8> for Address {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(Error::AddressOutOfRange(value))
        }
    }
}

impl std::ops::Deref for Address {
    type Target = u8;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Register bank a descriptor belongs to, which also selects the Modbus
/// function code used to access it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterCategory {
    /// Rated (nameplate) data, input registers at 0x3000.
    Rated,
    /// Realtime measurements, input registers at 0x3100.
    Realtime,
    /// Status bitfields, input registers at 0x3200.
    Status,
    /// Accumulated statistics, input registers at 0x3300.
    Stats,
    /// Battery settings, holding registers at 0x9000.
    Setting,
    /// Read/write single-bit outputs.
    Coil,
    /// Read-only single-bit inputs.
    DiscreteInput,
}

/// How a raw register word is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RegisterKind {
    /// Integer scaled by `10^decimals`.
    Scaled { decimals: u32 },
    /// Low word of a 32-bit pair, see [`combine_32bit`].
    PairLow,
    /// High word of a 32-bit pair.
    PairHigh,
    /// Packed status bits, decoded by a dedicated decoder.
    Bitfield,
    /// Single-bit coil or discrete input.
    Boolean,
}

/// One named register of the device's map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptor {
    pub name: &'static str,
    pub address: u16,
    pub kind: RegisterKind,
}

const fn scaled(name: &'static str, address: u16) -> RegisterDescriptor {
    RegisterDescriptor {
        name,
        address,
        kind: RegisterKind::Scaled { decimals: 2 },
    }
}

const fn raw(name: &'static str, address: u16) -> RegisterDescriptor {
    RegisterDescriptor {
        name,
        address,
        kind: RegisterKind::Scaled { decimals: 0 },
    }
}

const fn pair_low(name: &'static str, address: u16) -> RegisterDescriptor {
    RegisterDescriptor {
        name,
        address,
        kind: RegisterKind::PairLow,
    }
}

const fn pair_high(name: &'static str, address: u16) -> RegisterDescriptor {
    RegisterDescriptor {
        name,
        address,
        kind: RegisterKind::PairHigh,
    }
}

const fn bitfield(name: &'static str, address: u16) -> RegisterDescriptor {
    RegisterDescriptor {
        name,
        address,
        kind: RegisterKind::Bitfield,
    }
}

const fn boolean(name: &'static str, address: u16) -> RegisterDescriptor {
    RegisterDescriptor {
        name,
        address,
        kind: RegisterKind::Boolean,
    }
}

/// Rated data block, read only.
pub const RATED_REGISTERS: &[RegisterDescriptor] = &[
    scaled("pv_rated_voltage", 0x3000),
    scaled("pv_rated_current", 0x3001),
    pair_low("pv_rated_power_low", 0x3002),
    pair_high("pv_rated_power_high", 0x3003),
    scaled("battery_rated_voltage", 0x3004),
];

/// Realtime data block, read only.
///
/// The state of charge is listed at its protocol-document address 0x311A;
/// the offset actually used for decoding comes from [`RealtimeLayout`]
/// because it moves between firmware variants.
pub const REALTIME_REGISTERS: &[RegisterDescriptor] = &[
    scaled("pv_voltage", 0x3100),
    scaled("pv_current", 0x3101),
    pair_low("pv_power_low", 0x3102),
    pair_high("pv_power_high", 0x3103),
    scaled("battery_voltage", 0x3104),
    scaled("battery_current", 0x3105),
    pair_low("battery_power_low", 0x3106),
    pair_high("battery_power_high", 0x3107),
    scaled("load_voltage", 0x310C),
    scaled("load_current", 0x310D),
    pair_low("load_power_low", 0x310E),
    pair_high("load_power_high", 0x310F),
    scaled("battery_temperature", 0x3110),
    scaled("case_temperature", 0x3111),
    scaled("heatsink_temperature", 0x3112),
    scaled("battery_soc", 0x311A),
];

/// Status bitfield registers, read only.
pub const STATUS_REGISTERS: &[RegisterDescriptor] = &[
    bitfield("battery_status", 0x3200),
    bitfield("charging_equipment_status", 0x3201),
];

/// Statistics block, read only.
pub const STATS_REGISTERS: &[RegisterDescriptor] = &[
    scaled("max_pv_voltage_today", 0x3300),
    scaled("min_pv_voltage_today", 0x3301),
    scaled("max_battery_voltage_today", 0x3302),
    scaled("min_battery_voltage_today", 0x3303),
    pair_low("consumed_energy_today_low", 0x3304),
    pair_high("consumed_energy_today_high", 0x3305),
    pair_low("consumed_energy_month_low", 0x3306),
    pair_high("consumed_energy_month_high", 0x3307),
    pair_low("consumed_energy_year_low", 0x3308),
    pair_high("consumed_energy_year_high", 0x3309),
    pair_low("total_consumed_energy_low", 0x330A),
    pair_high("total_consumed_energy_high", 0x330B),
    pair_low("generated_energy_today_low", 0x330C),
    pair_high("generated_energy_today_high", 0x330D),
    pair_low("generated_energy_month_low", 0x330E),
    pair_high("generated_energy_month_high", 0x330F),
    pair_low("generated_energy_year_low", 0x3310),
    pair_high("generated_energy_year_high", 0x3311),
    pair_low("total_generated_energy_low", 0x3312),
    pair_high("total_generated_energy_high", 0x3313),
];

/// Battery settings block, read/write.
pub const SETTING_REGISTERS: &[RegisterDescriptor] = &[
    raw("battery_type", 0x9000),
    raw("battery_capacity", 0x9001),
    scaled("temperature_compensation_coefficient", 0x9002),
    scaled("high_voltage_disconnect", 0x9003),
    scaled("charging_limit_voltage", 0x9004),
    scaled("over_voltage_reconnect", 0x9005),
    scaled("equalization_voltage", 0x9006),
    scaled("boost_voltage", 0x9007),
    scaled("float_voltage", 0x9008),
    scaled("boost_reconnect_voltage", 0x9009),
    scaled("low_voltage_reconnect", 0x900A),
    scaled("under_voltage_recover", 0x900B),
    scaled("under_voltage_warning", 0x900C),
    scaled("low_voltage_disconnect", 0x900D),
    scaled("discharging_limit_voltage", 0x900E),
];

/// Load control coils, read/write.
pub const COIL_REGISTERS: &[RegisterDescriptor] = &[
    boolean("manual_load_control", 0x0002),
    boolean("load_test_mode", 0x0005),
    boolean("force_load_on", 0x0006),
];

/// Discrete inputs, read only.
pub const DISCRETE_INPUT_REGISTERS: &[RegisterDescriptor] = &[
    boolean("over_temperature_inside", 0x2000),
    boolean("day_night", 0x200C),
];

/// Returns the registers of a category, ordered by address.
pub fn registers(category: RegisterCategory) -> &'static [RegisterDescriptor] {
    match category {
        RegisterCategory::Rated => RATED_REGISTERS,
        RegisterCategory::Realtime => REALTIME_REGISTERS,
        RegisterCategory::Status => STATUS_REGISTERS,
        RegisterCategory::Stats => STATS_REGISTERS,
        RegisterCategory::Setting => SETTING_REGISTERS,
        RegisterCategory::Coil => COIL_REGISTERS,
        RegisterCategory::DiscreteInput => DISCRETE_INPUT_REGISTERS,
    }
}

/// Nameplate data of the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatedData {
    /// Rated PV array input voltage in volts.
    pub pv_voltage: f64,
    /// Rated PV array input current in amperes.
    pub pv_current: f64,
    /// Rated PV array input power in watts.
    pub pv_power: f64,
    /// Rated battery voltage in volts.
    pub battery_voltage: f64,
}

impl RatedData {
    pub const ADDRESS: u16 = 0x3000;
    pub const QUANTITY: u16 = 5;

    /// Decodes one rated-data block read.
    pub fn decode_from_input_registers(regs: &[u16]) -> Result<Self, Error> {
        check_count(Self::ADDRESS, Self::QUANTITY, regs)?;
        Ok(Self {
            pv_voltage: centi(regs[0]),
            pv_current: centi(regs[1]),
            pv_power: combine_32bit(regs[2], regs[3]),
            battery_voltage: centi(regs[4]),
        })
    }
}

impl std::fmt::Display for RatedData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PV {:.2} V / {:.2} A / {:.2} W, battery {:.2} V",
            self.pv_voltage, self.pv_current, self.pv_power, self.battery_voltage
        )
    }
}

/// Layout of the realtime data block.
///
/// The state of charge register moves between firmware variants: the LS-B
/// protocol document V1.1 places it at block offset 0x1A (register 0x311A),
/// while deployed units report it at offset 0x13. The offset is therefore a
/// configuration value, not a constant, and the block-read quantity follows
/// from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RealtimeLayout {
    soc_offset: u16,
}

impl RealtimeLayout {
    /// Smallest usable offset, directly after the temperature registers.
    pub const SOC_OFFSET_MIN: u16 = 0x13;
    /// Largest offset covered by the documented realtime block.
    pub const SOC_OFFSET_MAX: u16 = 0x1D;

    /// Layout per the LS-B protocol document V1.1 (register 0x311A).
    pub const PROTOCOL_V11: Self = Self { soc_offset: 0x1A };

    /// Block offset of the state of charge register.
    pub fn soc_offset(&self) -> u16 {
        self.soc_offset
    }

    /// Number of registers one realtime block read must request.
    pub fn quantity(&self) -> u16 {
        (self.soc_offset + 1).max(0x14)
    }
}

impl Default for RealtimeLayout {
    /// Layout observed on deployed LS-B units (state of charge at 0x3113).
    fn default() -> Self {
        Self { soc_offset: 0x13 }
    }
}

impl TryFrom<u16> for RealtimeLayout {
    type Error = Error;

    fn try_from(soc_offset: u16) -> Result<Self, Self::Error> {
        if (Self::SOC_OFFSET_MIN..=Self::SOC_OFFSET_MAX).contains(&soc_offset) {
            Ok(Self { soc_offset })
        } else {
            Err(Error::SocOffsetOutOfRange(soc_offset))
        }
    }
}

impl std::fmt::Display for RealtimeLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04X}", self.soc_offset)
    }
}

/// One realtime measurement snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RealtimeData {
    /// PV array input voltage in volts.
    pub pv_voltage: f64,
    /// PV array input current in amperes.
    pub pv_current: f64,
    /// PV array input power in watts.
    pub pv_power: f64,
    /// Battery voltage in volts.
    pub battery_voltage: f64,
    /// Battery charging current in amperes.
    pub battery_current: f64,
    /// Battery charging power in watts.
    pub battery_power: f64,
    /// Load output voltage in volts.
    pub load_voltage: f64,
    /// Load output current in amperes.
    pub load_current: f64,
    /// Load output power in watts.
    pub load_power: f64,
    /// Battery temperature in degrees Celsius.
    pub battery_temperature: f64,
    /// Temperature inside the case in degrees Celsius.
    pub case_temperature: f64,
    /// Heat sink temperature of the power components in degrees Celsius.
    pub heatsink_temperature: f64,
    /// Battery state of charge in percent.
    pub battery_soc: f64,
}

impl RealtimeData {
    pub const ADDRESS: u16 = 0x3100;

    /// Decodes one realtime block read laid out per `layout`.
    pub fn decode_from_input_registers(
        regs: &[u16],
        layout: &RealtimeLayout,
    ) -> Result<Self, Error> {
        check_count(Self::ADDRESS, layout.quantity(), regs)?;
        Ok(Self {
            pv_voltage: centi(regs[0]),
            pv_current: centi(regs[1]),
            pv_power: combine_32bit(regs[2], regs[3]),
            battery_voltage: centi(regs[4]),
            battery_current: centi(regs[5]),
            battery_power: combine_32bit(regs[6], regs[7]),
            load_voltage: centi(regs[12]),
            load_current: centi(regs[13]),
            load_power: combine_32bit(regs[14], regs[15]),
            battery_temperature: centi(regs[16]),
            case_temperature: centi(regs[17]),
            heatsink_temperature: centi(regs[18]),
            battery_soc: centi(regs[usize::from(layout.soc_offset())]),
        })
    }
}

impl std::fmt::Display for RealtimeData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "PV      {:7.2} V {:6.2} A {:8.2} W",
            self.pv_voltage, self.pv_current, self.pv_power
        )?;
        writeln!(
            f,
            "Battery {:7.2} V {:6.2} A {:8.2} W ({:.0} %)",
            self.battery_voltage, self.battery_current, self.battery_power, self.battery_soc
        )?;
        writeln!(
            f,
            "Load    {:7.2} V {:6.2} A {:8.2} W",
            self.load_voltage, self.load_current, self.load_power
        )?;
        write!(
            f,
            "Temperatures: battery {:.2} °C, case {:.2} °C, heat sink {:.2} °C",
            self.battery_temperature, self.case_temperature, self.heatsink_temperature
        )
    }
}

/// Accumulated statistics snapshot. Energy values are kilowatt hours.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatisticalData {
    pub max_pv_voltage_today: f64,
    pub min_pv_voltage_today: f64,
    pub max_battery_voltage_today: f64,
    pub min_battery_voltage_today: f64,
    pub consumed_energy_today: f64,
    pub consumed_energy_month: f64,
    pub consumed_energy_year: f64,
    pub consumed_energy_total: f64,
    pub generated_energy_today: f64,
    pub generated_energy_month: f64,
    pub generated_energy_year: f64,
    pub generated_energy_total: f64,
}

impl StatisticalData {
    pub const ADDRESS: u16 = 0x3300;
    pub const QUANTITY: u16 = 20;

    /// Decodes one statistics block read.
    pub fn decode_from_input_registers(regs: &[u16]) -> Result<Self, Error> {
        check_count(Self::ADDRESS, Self::QUANTITY, regs)?;
        Ok(Self {
            max_pv_voltage_today: centi(regs[0]),
            min_pv_voltage_today: centi(regs[1]),
            max_battery_voltage_today: centi(regs[2]),
            min_battery_voltage_today: centi(regs[3]),
            consumed_energy_today: combine_32bit(regs[4], regs[5]),
            consumed_energy_month: combine_32bit(regs[6], regs[7]),
            consumed_energy_year: combine_32bit(regs[8], regs[9]),
            consumed_energy_total: combine_32bit(regs[10], regs[11]),
            generated_energy_today: combine_32bit(regs[12], regs[13]),
            generated_energy_month: combine_32bit(regs[14], regs[15]),
            generated_energy_year: combine_32bit(regs[16], regs[17]),
            generated_energy_total: combine_32bit(regs[18], regs[19]),
        })
    }
}

impl std::fmt::Display for StatisticalData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "PV voltage today: min {:.2} V, max {:.2} V",
            self.min_pv_voltage_today, self.max_pv_voltage_today
        )?;
        writeln!(
            f,
            "Battery voltage today: min {:.2} V, max {:.2} V",
            self.min_battery_voltage_today, self.max_battery_voltage_today
        )?;
        writeln!(
            f,
            "Consumed kWh: today {:.2}, month {:.2}, year {:.2}, total {:.2}",
            self.consumed_energy_today,
            self.consumed_energy_month,
            self.consumed_energy_year,
            self.consumed_energy_total
        )?;
        write!(
            f,
            "Generated kWh: today {:.2}, month {:.2}, year {:.2}, total {:.2}",
            self.generated_energy_today,
            self.generated_energy_month,
            self.generated_energy_year,
            self.generated_energy_total
        )
    }
}

/// Battery voltage condition, low 4 bits of register 0x3200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatteryVoltageStatus {
    Normal,
    OverVoltage,
    UnderVoltage,
    LowVoltageDisconnect,
    Fault,
}

impl std::fmt::Display for BatteryVoltageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Normal => "normal",
            Self::OverVoltage => "over voltage",
            Self::UnderVoltage => "under voltage",
            Self::LowVoltageDisconnect => "low voltage disconnect",
            Self::Fault => "fault",
        };
        write!(f, "{text}")
    }
}

/// Battery temperature condition, bits 4 to 7 of register 0x3200.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatteryTemperatureStatus {
    Normal,
    OverTemperature,
    LowTemperature,
}

impl std::fmt::Display for BatteryTemperatureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Normal => "normal",
            Self::OverTemperature => "over temperature",
            Self::LowTemperature => "low temperature",
        };
        write!(f, "{text}")
    }
}

/// Decoded battery status register (0x3200).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatteryStatus {
    pub voltage: BatteryVoltageStatus,
    pub temperature: BatteryTemperatureStatus,
    pub internal_resistance_abnormal: bool,
    pub wrong_voltage_identification: bool,
}

impl BatteryStatus {
    pub const REGISTER: u16 = 0x3200;

    /// Decodes the raw battery status word.
    pub fn decode(word: u16) -> Result<Self, Error> {
        let voltage = match word & 0x000F {
            0 => BatteryVoltageStatus::Normal,
            1 => BatteryVoltageStatus::OverVoltage,
            2 => BatteryVoltageStatus::UnderVoltage,
            3 => BatteryVoltageStatus::LowVoltageDisconnect,
            4 => BatteryVoltageStatus::Fault,
            _ => return Err(Error::InvalidBatteryVoltageStatus(word)),
        };
        // The device wraps the temperature nibble modulo 3.
        let temperature = match ((word >> 4) & 0x000F) % 3 {
            0 => BatteryTemperatureStatus::Normal,
            1 => BatteryTemperatureStatus::OverTemperature,
            _ => BatteryTemperatureStatus::LowTemperature,
        };
        Ok(Self {
            voltage,
            temperature,
            internal_resistance_abnormal: word & 0x0100 != 0,
            wrong_voltage_identification: word & 0x8000 != 0,
        })
    }
}

impl std::fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "voltage {}, temperature {}",
            self.voltage, self.temperature
        )?;
        if self.internal_resistance_abnormal {
            write!(f, ", internal resistance abnormal")?;
        }
        if self.wrong_voltage_identification {
            write!(f, ", wrong voltage identification")?;
        }
        Ok(())
    }
}

/// PV input condition, bits 14 and 15 of register 0x3201.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum InputVoltageStatus {
    Normal,
    NoPower,
    HigherVoltage,
    InputVoltageError,
}

impl std::fmt::Display for InputVoltageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Normal => "normal",
            Self::NoPower => "no power",
            Self::HigherVoltage => "higher voltage input",
            Self::InputVoltageError => "input voltage error",
        };
        write!(f, "{text}")
    }
}

/// Charging stage, bits 2 and 3 of register 0x3201.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ChargingState {
    NoCharging,
    Float,
    Boost,
    Equalization,
}

impl std::fmt::Display for ChargingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::NoCharging => "no charging",
            Self::Float => "float",
            Self::Boost => "boost",
            Self::Equalization => "equalization",
        };
        write!(f, "{text}")
    }
}

/// Decoded charging equipment status register (0x3201).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChargingStatus {
    pub input_voltage: InputVoltageStatus,
    pub charging_mosfet_short: bool,
    pub charging_anti_reverse_short: bool,
    pub anti_reverse_short: bool,
    pub input_over_current: bool,
    pub load_over_current: bool,
    pub load_short: bool,
    pub load_mosfet_short: bool,
    pub pv_input_short: bool,
    pub state: ChargingState,
    pub fault: bool,
    pub running: bool,
}

impl ChargingStatus {
    pub const REGISTER: u16 = 0x3201;

    /// Decodes the raw charging equipment status word.
    pub fn decode(word: u16) -> Self {
        let input_voltage = match (word >> 14) & 0x0003 {
            0 => InputVoltageStatus::Normal,
            1 => InputVoltageStatus::NoPower,
            2 => InputVoltageStatus::HigherVoltage,
            _ => InputVoltageStatus::InputVoltageError,
        };
        let state = match (word >> 2) & 0x0003 {
            0 => ChargingState::NoCharging,
            1 => ChargingState::Float,
            2 => ChargingState::Boost,
            _ => ChargingState::Equalization,
        };
        Self {
            input_voltage,
            charging_mosfet_short: word & 0x2000 != 0,
            charging_anti_reverse_short: word & 0x1000 != 0,
            anti_reverse_short: word & 0x0800 != 0,
            input_over_current: word & 0x0400 != 0,
            load_over_current: word & 0x0200 != 0,
            load_short: word & 0x0100 != 0,
            load_mosfet_short: word & 0x0080 != 0,
            pv_input_short: word & 0x0010 != 0,
            state,
            fault: word & 0x0002 != 0,
            running: word & 0x0001 != 0,
        }
    }

    /// True if any of the single-bit fault conditions is set.
    pub fn any_fault_flag(&self) -> bool {
        self.charging_mosfet_short
            || self.charging_anti_reverse_short
            || self.anti_reverse_short
            || self.input_over_current
            || self.load_over_current
            || self.load_short
            || self.load_mosfet_short
            || self.pv_input_short
    }
}

impl std::fmt::Display for ChargingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}, input {}, {}",
            if self.running { "running" } else { "standby" },
            self.input_voltage,
            self.state
        )?;
        if self.fault {
            write!(f, ", FAULT")?;
        }
        for (set, label) in [
            (self.charging_mosfet_short, "charging MOSFET short"),
            (
                self.charging_anti_reverse_short,
                "charging anti-reverse short",
            ),
            (self.anti_reverse_short, "anti-reverse short"),
            (self.input_over_current, "input over current"),
            (self.load_over_current, "load over current"),
            (self.load_short, "load short"),
            (self.load_mosfet_short, "load MOSFET short"),
            (self.pv_input_short, "PV input short"),
        ] {
            if set {
                write!(f, ", {label}")?;
            }
        }
        Ok(())
    }
}

/// Both status bitfields, read as one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceStatus {
    pub battery: BatteryStatus,
    pub charging: ChargingStatus,
}

impl DeviceStatus {
    pub const ADDRESS: u16 = 0x3200;
    pub const QUANTITY: u16 = 2;

    /// Decodes one status block read.
    pub fn decode_from_input_registers(regs: &[u16]) -> Result<Self, Error> {
        check_count(Self::ADDRESS, Self::QUANTITY, regs)?;
        Ok(Self {
            battery: BatteryStatus::decode(regs[0])?,
            charging: ChargingStatus::decode(regs[1]),
        })
    }
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "battery: {}; charger: {}", self.battery, self.charging)
    }
}

/// Battery chemistry code, settings register 0x9000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BatteryType {
    User,
    Sealed,
    Gel,
    Flooded,
}

impl TryFrom<u16> for BatteryType {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::User),
            1 => Ok(Self::Sealed),
            2 => Ok(Self::Gel),
            3 => Ok(Self::Flooded),
            other => Err(Error::InvalidBatteryType(other)),
        }
    }
}

impl std::fmt::Display for BatteryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::User => "user",
            Self::Sealed => "sealed",
            Self::Gel => "gel",
            Self::Flooded => "flooded",
        };
        write!(f, "{text}")
    }
}

/// The 15-word battery settings block at 0x9000.
///
/// Word 0 is the battery type, word 1 the capacity in Ah, word 2 the
/// temperature compensation coefficient; words 3 to 14 are voltage thresholds
/// in hundredths of a volt, expressed for a 12 V pack. [`Self::customize`]
/// scales them to larger nominal voltages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BatterySettings([u16; 15]);

impl BatterySettings {
    pub const ADDRESS: u16 = 0x9000;
    pub const QUANTITY: u16 = 15;

    /// Capacity the presets are expressed for, in Ah.
    pub const BASE_CAPACITY: u16 = 100;
    /// Nominal pack voltage the threshold words are expressed for.
    pub const BASE_VOLTAGE: u16 = 12;

    /// First word that scales with the nominal pack voltage.
    const FIRST_VOLTAGE_WORD: usize = 3;

    /// Factory curve for lead-acid packs (12 V, 100 Ah).
    pub const LEAD_ACID: Self = Self([
        0, 300, 300, 1620, 1500, 1500, 1460, 1440, 1380, 1630, 1260, 1220, 1200, 1110, 1060,
    ]);

    /// Factory curve for LiFePO4 packs (12 V, 100 Ah).
    pub const LIFEPO4: Self = Self([
        0, 300, 300, 1500, 1460, 1420, 1400, 1380, 1380, 1320, 1240, 1200, 1160, 1080, 1040,
    ]);

    /// Adapts a 12 V / 100 Ah base curve to the given pack.
    ///
    /// A capacity other than 100 Ah replaces the capacity word. A nominal
    /// voltage above 12 V scales every threshold word by `voltage / 12`,
    /// truncating to whole register units; the type, capacity and
    /// compensation words never scale.
    pub fn customize(&self, capacity: u16, voltage: u16) -> Result<Self, Error> {
        if voltage < Self::BASE_VOLTAGE {
            return Err(Error::NominalVoltageTooLow(voltage));
        }
        let mut words = self.0;
        if capacity != Self::BASE_CAPACITY {
            words[1] = capacity;
        }
        if voltage > Self::BASE_VOLTAGE {
            let ratio = f64::from(voltage) / f64::from(Self::BASE_VOLTAGE);
            for word in &mut words[Self::FIRST_VOLTAGE_WORD..] {
                *word = (f64::from(*word) * ratio) as u16;
            }
        }
        Ok(Self(words))
    }

    /// Decodes one settings block read.
    pub fn decode_from_holding_registers(regs: &[u16]) -> Result<Self, Error> {
        check_count(Self::ADDRESS, Self::QUANTITY, regs)?;
        let mut words = [0u16; Self::QUANTITY as usize];
        words.copy_from_slice(regs);
        Ok(Self(words))
    }

    /// The raw words for one multi-register write transaction.
    pub fn encode_for_write_registers(&self) -> &[u16] {
        &self.0
    }

    pub fn battery_type(&self) -> Result<BatteryType, Error> {
        BatteryType::try_from(self.0[0])
    }

    /// Battery capacity in Ah.
    pub fn capacity(&self) -> u16 {
        self.0[1]
    }

    /// Temperature compensation coefficient.
    pub fn temperature_compensation(&self) -> f64 {
        centi(self.0[2])
    }

    /// Named voltage thresholds in volts, ordered as on the wire.
    pub fn voltage_thresholds(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        SETTING_REGISTERS[Self::FIRST_VOLTAGE_WORD..]
            .iter()
            .zip(&self.0[Self::FIRST_VOLTAGE_WORD..])
            .map(|(descriptor, raw)| (descriptor.name, centi(*raw)))
    }
}

impl std::fmt::Display for BatterySettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.battery_type() {
            Ok(battery_type) => writeln!(f, "battery type: {battery_type}")?,
            Err(_) => writeln!(f, "battery type: unknown ({})", self.0[0])?,
        }
        writeln!(f, "capacity: {} Ah", self.capacity())?;
        writeln!(
            f,
            "temperature compensation: {:.2}",
            self.temperature_compensation()
        )?;
        let mut thresholds = self.voltage_thresholds().peekable();
        while let Some((name, volts)) = thresholds.next() {
            write!(f, "{name}: {volts:.2} V")?;
            if thresholds.peek().is_some() {
                writeln!(f)?;
            }
        }
        Ok(())
    }
}

/// Read/write single-bit outputs of the load controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Coil {
    /// Manual load on/off when the load is in manual mode.
    ManualLoadControl,
    /// Enables the load test mode.
    LoadTestMode,
    /// Forces the load on or off regardless of mode.
    ForceLoadOn,
}

impl Coil {
    pub fn address(self) -> u16 {
        match self {
            Self::ManualLoadControl => 0x0002,
            Self::LoadTestMode => 0x0005,
            Self::ForceLoadOn => 0x0006,
        }
    }
}

/// Read-only single-bit inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DiscreteInput {
    /// Over-temperature condition inside the device.
    OverTemperature,
    /// Day/night detection from the PV input voltage.
    DayNight,
}

impl DiscreteInput {
    pub fn address(self) -> u16 {
        match self {
            Self::OverTemperature => 0x2000,
            Self::DayNight => 0x200C,
        }
    }
}

/// Day/night state reported by discrete input 0x200C (1 = night).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DayNight {
    Day,
    Night,
}

impl From<bool> for DayNight {
    fn from(bit: bool) -> Self {
        if bit {
            Self::Night
        } else {
            Self::Day
        }
    }
}

impl std::fmt::Display for DayNight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Day => write!(f, "day"),
            Self::Night => write!(f, "night"),
        }
    }
}

/// Desired state of the three load control coils.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LoadControl {
    pub manual_on: bool,
    pub test_mode: bool,
    pub force_on: bool,
}

/// Snapshot of the coil and discrete-input banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SystemStatus {
    pub load_on: bool,
    pub test_mode: bool,
    pub force_load_on: bool,
    pub over_temperature: bool,
    pub day_night: DayNight,
}

impl SystemStatus {
    /// The coil bank is read as one block covering 0x0002 to 0x0006.
    pub const COIL_ADDRESS: u16 = 0x0002;
    pub const COIL_QUANTITY: u16 = 5;
    /// The discrete-input bank is read as one block covering 0x2000 to 0x200C.
    pub const DISCRETE_ADDRESS: u16 = 0x2000;
    pub const DISCRETE_QUANTITY: u16 = 13;

    /// Decodes the coil block and discrete-input block reads.
    pub fn decode_from_bits(coils: &[bool], discrete_inputs: &[bool]) -> Result<Self, Error> {
        check_count(Self::COIL_ADDRESS, Self::COIL_QUANTITY, coils)?;
        check_count(
            Self::DISCRETE_ADDRESS,
            Self::DISCRETE_QUANTITY,
            discrete_inputs,
        )?;
        Ok(Self {
            load_on: coils[0],
            test_mode: coils[3],
            force_load_on: coils[4],
            over_temperature: discrete_inputs[0],
            day_night: DayNight::from(discrete_inputs[12]),
        })
    }
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "load {}, test mode {}, force load {}, over temperature {}, {}",
            if self.load_on { "on" } else { "off" },
            if self.test_mode { "on" } else { "off" },
            if self.force_load_on { "on" } else { "off" },
            if self.over_temperature { "YES" } else { "no" },
            self.day_night
        )
    }
}

/// Which optional register banks the connected device implements.
///
/// Deployed LS-B units answer the rated/realtime/statistics blocks but stay
/// silent or return an illegal-address exception on the other banks. The
/// flags are established once by a probe and cached by the stateful clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capabilities {
    /// Holding-register settings bank at 0x9000.
    pub battery_settings: bool,
    /// Status bitfield registers at 0x3200.
    pub status_registers: bool,
    /// Load control coils at 0x0002.
    pub load_coils: bool,
    /// Discrete inputs at 0x2000.
    pub discrete_inputs: bool,
}

impl Capabilities {
    /// True if the full coil/discrete-input snapshot can be read.
    pub fn system_status(&self) -> bool {
        self.load_coils && self.discrete_inputs
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let yes_no = |flag| if flag { "yes" } else { "no" };
        write!(
            f,
            "battery settings: {}, status registers: {}, load coils: {}, discrete inputs: {}",
            yes_no(self.battery_settings),
            yes_no(self.status_registers),
            yes_no(self.load_coils),
            yes_no(self.discrete_inputs)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn combine_32bit_reference_values() {
        assert_eq!(combine_32bit(0, 1), 655.36);
        assert_eq!(combine_32bit(100, 0), 1.0);
        assert_eq!(combine_32bit(0, 0), 0.0);
        assert_eq!(combine_32bit(u16::MAX, u16::MAX), 42949672.95);
    }

    #[test]
    fn combine_32bit_is_monotonic_and_non_negative() {
        let samples = [
            (0u16, 0u16),
            (1, 0),
            (u16::MAX, 0),
            (0, 1),
            (1, 1),
            (u16::MAX, u16::MAX),
        ];
        let mut previous = -1.0;
        for (low, high) in samples {
            let value = combine_32bit(low, high);
            assert!(value >= 0.0);
            assert!(value > previous, "{low}/{high} not above {previous}");
            previous = value;
        }
    }

    #[test]
    fn scale_by_decimals() {
        assert_eq!(scale(1234, 2), 12.34);
        assert_eq!(scale(1234, 1), 123.4);
        assert_eq!(scale(1234, 0), 1234.0);
    }

    #[test]
    fn address_range() {
        assert_matches!(Address::try_from(0), Err(Error::AddressOutOfRange(0)));
        assert_matches!(Address::try_from(1), Ok(address) if *address == 1);
        assert_matches!(Address::try_from(247), Ok(address) if *address == 247);
        assert_matches!(Address::try_from(248), Err(Error::AddressOutOfRange(248)));
    }

    fn assert_sorted_by_address(category: RegisterCategory) {
        let table = registers(category);
        for window in table.windows(2) {
            assert!(
                window[0].address < window[1].address,
                "{category:?}: {} not below {}",
                window[0].name,
                window[1].name
            );
        }
    }

    #[test]
    fn register_tables_are_sorted_by_address() {
        for category in [
            RegisterCategory::Rated,
            RegisterCategory::Realtime,
            RegisterCategory::Status,
            RegisterCategory::Stats,
            RegisterCategory::Setting,
            RegisterCategory::Coil,
            RegisterCategory::DiscreteInput,
        ] {
            assert_sorted_by_address(category);
        }
    }

    #[test]
    fn block_tables_match_block_read_ranges() {
        let rated = registers(RegisterCategory::Rated);
        assert_eq!(rated[0].address, RatedData::ADDRESS);
        assert_eq!(rated.len(), usize::from(RatedData::QUANTITY));
        for (offset, descriptor) in rated.iter().enumerate() {
            assert_eq!(descriptor.address, RatedData::ADDRESS + offset as u16);
        }

        let stats = registers(RegisterCategory::Stats);
        assert_eq!(stats[0].address, StatisticalData::ADDRESS);
        assert_eq!(stats.len(), usize::from(StatisticalData::QUANTITY));
        for (offset, descriptor) in stats.iter().enumerate() {
            assert_eq!(
                descriptor.address,
                StatisticalData::ADDRESS + offset as u16
            );
        }

        let settings = registers(RegisterCategory::Setting);
        assert_eq!(settings[0].address, BatterySettings::ADDRESS);
        assert_eq!(settings.len(), usize::from(BatterySettings::QUANTITY));
        for (offset, descriptor) in settings.iter().enumerate() {
            assert_eq!(descriptor.address, BatterySettings::ADDRESS + offset as u16);
        }

        let status = registers(RegisterCategory::Status);
        assert_eq!(status[0].address, BatteryStatus::REGISTER);
        assert_eq!(status[1].address, ChargingStatus::REGISTER);
    }

    #[test]
    fn pair_registers_are_adjacent() {
        for category in [
            RegisterCategory::Rated,
            RegisterCategory::Realtime,
            RegisterCategory::Stats,
        ] {
            let table = registers(category);
            for (index, descriptor) in table.iter().enumerate() {
                if descriptor.kind == RegisterKind::PairLow {
                    let high = &table[index + 1];
                    assert_eq!(high.kind, RegisterKind::PairHigh);
                    assert_eq!(high.address, descriptor.address + 1);
                }
            }
        }
    }

    #[test]
    fn realtime_layout_bounds() {
        assert_eq!(RealtimeLayout::default().soc_offset(), 0x13);
        assert_eq!(RealtimeLayout::default().quantity(), 20);
        assert_eq!(RealtimeLayout::PROTOCOL_V11.soc_offset(), 0x1A);
        assert_eq!(RealtimeLayout::PROTOCOL_V11.quantity(), 27);
        assert_matches!(RealtimeLayout::try_from(0x13), Ok(_));
        assert_matches!(RealtimeLayout::try_from(0x1D), Ok(_));
        assert_matches!(
            RealtimeLayout::try_from(0x12),
            Err(Error::SocOffsetOutOfRange(0x12))
        );
        assert_matches!(
            RealtimeLayout::try_from(0x1E),
            Err(Error::SocOffsetOutOfRange(0x1E))
        );
    }

    #[test]
    fn decode_rated_data() {
        let regs = [1100, 200, 20000, 1, 1200];
        let rated = RatedData::decode_from_input_registers(&regs).unwrap();
        assert_eq!(rated.pv_voltage, 11.0);
        assert_eq!(rated.pv_current, 2.0);
        assert_eq!(rated.pv_power, 855.36);
        assert_eq!(rated.battery_voltage, 12.0);
    }

    #[test]
    fn decode_rated_data_rejects_short_block() {
        assert_matches!(
            RatedData::decode_from_input_registers(&[0; 4]),
            Err(Error::RegisterCountMismatch {
                address: RatedData::ADDRESS,
                expected: 5,
                actual: 4,
            })
        );
    }

    #[test]
    fn decode_realtime_data_default_layout() {
        let mut regs = [0u16; 20];
        regs[0] = 8012; // PV 80.12 V
        regs[1] = 150; // 1.50 A
        regs[2] = 12018; // power low
        regs[3] = 0; // power high
        regs[4] = 1320; // battery 13.20 V
        regs[5] = 700;
        regs[6] = 9240;
        regs[7] = 0;
        regs[12] = 1310;
        regs[13] = 120;
        regs[14] = 1572;
        regs[15] = 0;
        regs[16] = 2512; // battery temperature
        regs[17] = 2711;
        regs[18] = 3001;
        regs[19] = 8500; // state of charge 85 %
        let layout = RealtimeLayout::default();
        let data = RealtimeData::decode_from_input_registers(&regs, &layout).unwrap();
        assert_eq!(data.pv_voltage, 80.12);
        assert_eq!(data.pv_current, 1.5);
        assert_eq!(data.pv_power, 120.18);
        assert_eq!(data.battery_voltage, 13.2);
        assert_eq!(data.battery_power, 92.4);
        assert_eq!(data.load_voltage, 13.1);
        assert_eq!(data.load_power, 15.72);
        assert_eq!(data.battery_temperature, 25.12);
        assert_eq!(data.heatsink_temperature, 30.01);
        assert_eq!(data.battery_soc, 85.0);
    }

    #[test]
    fn decode_realtime_data_protocol_layout() {
        let layout = RealtimeLayout::PROTOCOL_V11;
        let mut regs = vec![0u16; usize::from(layout.quantity())];
        regs[0x1A] = 4200;
        let data = RealtimeData::decode_from_input_registers(&regs, &layout).unwrap();
        assert_eq!(data.battery_soc, 42.0);
        // A block sized for the default layout must be rejected.
        assert_matches!(
            RealtimeData::decode_from_input_registers(&regs[..20], &layout),
            Err(Error::RegisterCountMismatch {
                expected: 27,
                actual: 20,
                ..
            })
        );
    }

    #[test]
    fn decode_statistical_data() {
        let mut regs = [0u16; 20];
        regs[0] = 9000; // max PV today 90.00 V
        regs[1] = 100;
        regs[2] = 1480;
        regs[3] = 1190;
        regs[4] = 50; // consumed today 0.50 kWh
        regs[5] = 0;
        regs[18] = 0; // generated total low
        regs[19] = 2; // generated total high
        let stats = StatisticalData::decode_from_input_registers(&regs).unwrap();
        assert_eq!(stats.max_pv_voltage_today, 90.0);
        assert_eq!(stats.min_pv_voltage_today, 1.0);
        assert_eq!(stats.max_battery_voltage_today, 14.8);
        assert_eq!(stats.min_battery_voltage_today, 11.9);
        assert_eq!(stats.consumed_energy_today, 0.5);
        assert_eq!(stats.generated_energy_total, 1310.72);
    }

    #[test]
    fn decode_battery_status_all_clear() {
        let status = BatteryStatus::decode(0x0000).unwrap();
        assert_eq!(status.voltage, BatteryVoltageStatus::Normal);
        assert_eq!(status.temperature, BatteryTemperatureStatus::Normal);
        assert!(!status.internal_resistance_abnormal);
        assert!(!status.wrong_voltage_identification);
    }

    #[test]
    fn decode_battery_status_fields() {
        let status = BatteryStatus::decode(0x0103).unwrap();
        assert_eq!(status.voltage, BatteryVoltageStatus::LowVoltageDisconnect);
        assert!(status.internal_resistance_abnormal);

        let status = BatteryStatus::decode(0x8000).unwrap();
        assert!(status.wrong_voltage_identification);
        assert_eq!(status.voltage, BatteryVoltageStatus::Normal);

        // Temperature nibble wraps modulo 3.
        assert_eq!(
            BatteryStatus::decode(0x0010).unwrap().temperature,
            BatteryTemperatureStatus::OverTemperature
        );
        assert_eq!(
            BatteryStatus::decode(0x0020).unwrap().temperature,
            BatteryTemperatureStatus::LowTemperature
        );
        assert_eq!(
            BatteryStatus::decode(0x0030).unwrap().temperature,
            BatteryTemperatureStatus::Normal
        );
    }

    #[test]
    fn decode_battery_status_rejects_undefined_voltage_bits() {
        assert_matches!(
            BatteryStatus::decode(0x0005),
            Err(Error::InvalidBatteryVoltageStatus(0x0005))
        );
        assert_matches!(
            BatteryStatus::decode(0x000F),
            Err(Error::InvalidBatteryVoltageStatus(0x000F))
        );
    }

    #[test]
    fn decode_charging_status_running_only() {
        let status = ChargingStatus::decode(0x0001);
        assert!(status.running);
        assert!(!status.fault);
        assert_eq!(status.state, ChargingState::NoCharging);
        assert_eq!(status.input_voltage, InputVoltageStatus::Normal);
        assert!(!status.any_fault_flag());
    }

    #[test]
    fn decode_charging_status_boost_with_mosfet_short() {
        let status = ChargingStatus::decode(0x2008);
        assert_eq!(status.state, ChargingState::Boost);
        assert!(status.charging_mosfet_short);
        assert!(!status.fault);
        assert!(!status.running);
        assert!(!status.anti_reverse_short);
    }

    #[test]
    fn decode_charging_status_bit_table() {
        assert_eq!(
            ChargingStatus::decode(0x4000).input_voltage,
            InputVoltageStatus::NoPower
        );
        assert_eq!(
            ChargingStatus::decode(0x8000).input_voltage,
            InputVoltageStatus::HigherVoltage
        );
        assert_eq!(
            ChargingStatus::decode(0xC000).input_voltage,
            InputVoltageStatus::InputVoltageError
        );
        assert!(ChargingStatus::decode(0x1000).charging_anti_reverse_short);
        assert!(ChargingStatus::decode(0x0800).anti_reverse_short);
        assert!(ChargingStatus::decode(0x0400).input_over_current);
        assert!(ChargingStatus::decode(0x0200).load_over_current);
        assert!(ChargingStatus::decode(0x0100).load_short);
        assert!(ChargingStatus::decode(0x0080).load_mosfet_short);
        assert!(ChargingStatus::decode(0x0010).pv_input_short);
        assert_eq!(ChargingStatus::decode(0x0004).state, ChargingState::Float);
        assert_eq!(
            ChargingStatus::decode(0x000C).state,
            ChargingState::Equalization
        );
        assert!(ChargingStatus::decode(0x0002).fault);
    }

    #[test]
    fn decode_device_status_block() {
        let status = DeviceStatus::decode_from_input_registers(&[0x0000, 0x0001]).unwrap();
        assert_eq!(status.battery.voltage, BatteryVoltageStatus::Normal);
        assert!(status.charging.running);
        assert_matches!(
            DeviceStatus::decode_from_input_registers(&[0x0000]),
            Err(Error::RegisterCountMismatch {
                expected: 2,
                actual: 1,
                ..
            })
        );
    }

    #[test]
    fn battery_type_codes() {
        assert_matches!(BatteryType::try_from(0), Ok(BatteryType::User));
        assert_matches!(BatteryType::try_from(1), Ok(BatteryType::Sealed));
        assert_matches!(BatteryType::try_from(2), Ok(BatteryType::Gel));
        assert_matches!(BatteryType::try_from(3), Ok(BatteryType::Flooded));
        assert_matches!(BatteryType::try_from(4), Err(Error::InvalidBatteryType(4)));
    }

    #[test]
    fn customize_settings_capacity_and_voltage() {
        let settings = BatterySettings::LEAD_ACID.customize(150, 24).unwrap();
        let words = settings.encode_for_write_registers();
        assert_eq!(words[0], 0);
        assert_eq!(words[1], 150);
        assert_eq!(words[2], 300);
        assert_eq!(words[3], 3240);
        assert_eq!(words[4], 3000);
        assert_eq!(words[14], 2120);
        // Every threshold word doubles at 24 V.
        for (base, scaled) in BatterySettings::LEAD_ACID.0[3..].iter().zip(&words[3..]) {
            assert_eq!(*scaled, base * 2);
        }
    }

    #[test]
    fn customize_settings_base_pack_is_identity() {
        let settings = BatterySettings::LIFEPO4.customize(100, 12).unwrap();
        assert_eq!(settings, BatterySettings::LIFEPO4);
    }

    #[test]
    fn customize_settings_truncates() {
        // 36 V triples the thresholds exactly.
        let base = BatterySettings([0, 300, 300, 1111, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let settings = base.customize(100, 36).unwrap();
        assert_eq!(settings.encode_for_write_registers()[3], 3333);

        // 1001 * 13 / 12 = 1084.41.., truncated.
        let base = BatterySettings([0, 300, 300, 1001, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        let settings = base.customize(100, 13).unwrap();
        assert_eq!(settings.encode_for_write_registers()[3], 1084);
    }

    #[test]
    fn customize_settings_rejects_low_voltage() {
        assert_matches!(
            BatterySettings::LEAD_ACID.customize(100, 11),
            Err(Error::NominalVoltageTooLow(11))
        );
    }

    #[test]
    fn settings_roundtrip_through_registers() {
        let words = BatterySettings::LEAD_ACID
            .encode_for_write_registers()
            .to_vec();
        let decoded = BatterySettings::decode_from_holding_registers(&words).unwrap();
        assert_eq!(decoded, BatterySettings::LEAD_ACID);
        assert_matches!(decoded.battery_type(), Ok(BatteryType::User));
        assert_eq!(decoded.capacity(), 300);
    }

    #[test]
    fn coil_and_discrete_addresses() {
        assert_eq!(Coil::ManualLoadControl.address(), 0x0002);
        assert_eq!(Coil::LoadTestMode.address(), 0x0005);
        assert_eq!(Coil::ForceLoadOn.address(), 0x0006);
        assert_eq!(DiscreteInput::OverTemperature.address(), 0x2000);
        assert_eq!(DiscreteInput::DayNight.address(), 0x200C);
    }

    #[test]
    fn day_night_wire_decode() {
        assert_eq!(DayNight::from(false), DayNight::Day);
        assert_eq!(DayNight::from(true), DayNight::Night);
    }

    #[test]
    fn decode_system_status_bits() {
        let mut coils = [false; 5];
        coils[0] = true; // manual load on
        coils[4] = true; // force load on
        let mut discrete = [false; 13];
        discrete[12] = true; // night
        let status = SystemStatus::decode_from_bits(&coils, &discrete).unwrap();
        assert!(status.load_on);
        assert!(!status.test_mode);
        assert!(status.force_load_on);
        assert!(!status.over_temperature);
        assert_eq!(status.day_night, DayNight::Night);

        assert_matches!(
            SystemStatus::decode_from_bits(&coils[..4], &discrete),
            Err(Error::RegisterCountMismatch {
                expected: 5,
                actual: 4,
                ..
            })
        );
    }

    #[test]
    fn capabilities_system_status() {
        let mut capabilities = Capabilities {
            battery_settings: false,
            status_registers: false,
            load_coils: true,
            discrete_inputs: true,
        };
        assert!(capabilities.system_status());
        capabilities.discrete_inputs = false;
        assert!(!capabilities.system_status());
    }
}
