//! Canonical header catalogues for the four core tables, plus a
//! header-translation facility mapping historical header sets onto the
//! current one (spec.md §2 item 2, §6 "Persisted archive").

use std::collections::HashMap;

/// Canonical semantic names for raw-table columns (spec.md §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RawHeader {
    DataPoint,
    TestTime,
    StepTime,
    DateTime,
    CycleIndex,
    StepIndex,
    SubStepIndex,
    Current,
    Voltage,
    ChargeCapacity,
    DischargeCapacity,
    InternalResistance,
}

impl RawHeader {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DataPoint => "data_point",
            Self::TestTime => "test_time",
            Self::StepTime => "step_time",
            Self::DateTime => "date_time",
            Self::CycleIndex => "cycle_index",
            Self::StepIndex => "step_index",
            Self::SubStepIndex => "sub_step_index",
            Self::Current => "current",
            Self::Voltage => "voltage",
            Self::ChargeCapacity => "charge_capacity",
            Self::DischargeCapacity => "discharge_capacity",
            Self::InternalResistance => "internal_resistance",
        }
    }

    /// Columns a loader must populate; anything else is optional/auxiliary.
    pub const REQUIRED: &'static [RawHeader] = &[
        RawHeader::DataPoint,
        RawHeader::TestTime,
        RawHeader::StepTime,
        RawHeader::DateTime,
        RawHeader::CycleIndex,
        RawHeader::StepIndex,
        RawHeader::Current,
        RawHeader::Voltage,
        RawHeader::ChargeCapacity,
        RawHeader::DischargeCapacity,
    ];
}

/// Canonical semantic names for steps-table columns (spec.md §3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepHeader {
    Cycle,
    Step,
    Ustep,
    SubStep,
    Type,
    SubType,
    Info,
    RateAvr,
}

impl StepHeader {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cycle => "cycle",
            Self::Step => "step",
            Self::Ustep => "ustep",
            Self::SubStep => "sub_step",
            Self::Type => "type",
            Self::SubType => "sub_type",
            Self::Info => "info",
            Self::RateAvr => "rate_avr",
        }
    }
}

/// The eight statistic-bearing source columns used per step (spec.md §3.1);
/// each produces `{first,last,min,max,avr,std,delta}` suffixed columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepStatSource {
    Voltage,
    Current,
    Charge,
    Discharge,
    InternalResistance,
    Point,
    TestTime,
    StepTime,
}

impl StepStatSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Voltage => "voltage",
            Self::Current => "current",
            Self::Charge => "charge",
            Self::Discharge => "discharge",
            Self::InternalResistance => "internal_resistance",
            Self::Point => "point",
            Self::TestTime => "test_time",
            Self::StepTime => "step_time",
        }
    }

    pub const ALL: &'static [StepStatSource] = &[
        Self::Voltage,
        Self::Current,
        Self::Charge,
        Self::Discharge,
        Self::InternalResistance,
        Self::Point,
        Self::TestTime,
        Self::StepTime,
    ];
}

/// Summary-table base columns (spec.md §4.3), not including the
/// `_gravimetric`/`_areal`/`_absolute` composite keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SummaryHeader {
    CycleIndex,
    DataPoint,
    TestTime,
    DateTime,
    DischargeCapacity,
    ChargeCapacity,
    CoulombicEfficiency,
    CumulatedCoulombicEfficiency,
    CoulombicDifference,
    CumulatedCoulombicDifference,
    CumulatedChargeCapacity,
    CumulatedDischargeCapacity,
    DischargeCapacityLoss,
    ChargeCapacityLoss,
    CumulatedDischargeCapacityLoss,
    CumulatedChargeCapacityLoss,
    ShiftedChargeCapacity,
    ShiftedDischargeCapacity,
    CumulatedRic,
    CumulatedRicSei,
    CumulatedRicDisconnect,
    EndVoltageDischarge,
    EndVoltageCharge,
    IrDischarge,
    IrCharge,
    ChargeCRate,
    DischargeCRate,
    NormalizedCycleIndex,
}

impl SummaryHeader {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CycleIndex => "cycle_index",
            Self::DataPoint => "data_point",
            Self::TestTime => "test_time",
            Self::DateTime => "date_time",
            Self::DischargeCapacity => "discharge_capacity",
            Self::ChargeCapacity => "charge_capacity",
            Self::CoulombicEfficiency => "coulombic_efficiency",
            Self::CumulatedCoulombicEfficiency => "cumulated_coulombic_efficiency",
            Self::CoulombicDifference => "coulombic_difference",
            Self::CumulatedCoulombicDifference => "cumulated_coulombic_difference",
            Self::CumulatedChargeCapacity => "cumulated_charge_capacity",
            Self::CumulatedDischargeCapacity => "cumulated_discharge_capacity",
            Self::DischargeCapacityLoss => "discharge_capacity_loss",
            Self::ChargeCapacityLoss => "charge_capacity_loss",
            Self::CumulatedDischargeCapacityLoss => "cumulated_discharge_capacity_loss",
            Self::CumulatedChargeCapacityLoss => "cumulated_charge_capacity_loss",
            Self::ShiftedChargeCapacity => "shifted_charge_capacity",
            Self::ShiftedDischargeCapacity => "shifted_discharge_capacity",
            Self::CumulatedRic => "cumulated_ric",
            Self::CumulatedRicSei => "cumulated_ric_sei",
            Self::CumulatedRicDisconnect => "cumulated_ric_disconnect",
            Self::EndVoltageDischarge => "end_voltage_discharge",
            Self::EndVoltageCharge => "end_voltage_charge",
            Self::IrDischarge => "ir_discharge",
            Self::IrCharge => "ir_charge",
            Self::ChargeCRate => "charge_c_rate",
            Self::DischargeCRate => "discharge_c_rate",
            Self::NormalizedCycleIndex => "normalized_cycle_index",
        }
    }
}

/// The base columns eligible for `_gravimetric`/`_areal`/`_absolute`
/// specific variants (spec.md §4.3 "Specific variants").
pub const SPECIFIC_VARIANT_BASES: &[SummaryHeader] = &[
    SummaryHeader::DischargeCapacity,
    SummaryHeader::ChargeCapacity,
    SummaryHeader::CumulatedChargeCapacity,
    SummaryHeader::CumulatedDischargeCapacity,
    SummaryHeader::CoulombicDifference,
    SummaryHeader::CumulatedCoulombicDifference,
    SummaryHeader::DischargeCapacityLoss,
    SummaryHeader::ChargeCapacityLoss,
    SummaryHeader::CumulatedDischargeCapacityLoss,
    SummaryHeader::CumulatedChargeCapacityLoss,
    SummaryHeader::ShiftedChargeCapacity,
    SummaryHeader::ShiftedDischargeCapacity,
];

/// Composite key for a specific-variant summary column: a base column plus
/// the normalization postfix (spec.md §9: "postfix becomes a composite key
/// rather than a runtime string split").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SpecificColumnKey {
    pub base: SummaryHeader,
    pub postfix: crate::units::SpecificMode,
}

impl SpecificColumnKey {
    pub fn column_name(&self) -> String {
        use crate::units::SpecificMode::*;
        let suffix = match self.postfix {
            Gravimetric => "gravimetric",
            Areal => "areal",
            Volumetric => "volumetric",
            Absolute => "absolute",
        };
        format!("{}_{}", self.base.as_str(), suffix)
    }
}

/// Maps historical header names (from older archive/export generations)
/// onto the current canonical `RawHeader` names (spec.md §6 "Persisted
/// archive": legacy header names are translated; unmatched historical
/// columns are dropped).
#[derive(Debug, Default, Clone)]
pub struct HeaderTranslationTable {
    legacy_to_current: HashMap<String, String>,
}

impl HeaderTranslationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mut self, legacy: impl Into<String>, current: impl Into<String>) -> Self {
        self.legacy_to_current.insert(legacy.into(), current.into());
        self
    }

    /// Translates a legacy column name; returns the name unchanged if no
    /// mapping is registered for it (it may already be current).
    pub fn translate<'a>(&'a self, legacy_name: &'a str) -> &'a str {
        self.legacy_to_current
            .get(legacy_name)
            .map(String::as_str)
            .unwrap_or(legacy_name)
    }

    /// Applying the translation twice is idempotent (P6): once a header is
    /// current it is never a key in `legacy_to_current` again.
    pub fn is_idempotent_for(&self, name: &str) -> bool {
        let once = self.translate(name);
        let twice = self.translate(once);
        once == twice
    }
}
