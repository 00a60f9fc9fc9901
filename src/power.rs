//! Transmit power calibration
//!
//! Power is requested as an abstract index: index 0 is the highest power the
//! table allows and every step reduces the output by about 0.25 dB. The
//! engine translates indexes into `TX_POWER` register values and back.
//!
//! A `TX_POWER` byte holds a 2-bit coarse gain in bits 0-1 and a 6-bit fine
//! gain in bits 2-7. Each channel has one or more [`PowerLut`]s, one per PLL
//! bias trim. A table is a chain of coarse stages; within a stage the fine
//! gain steps down along the shared [`FINE_DELTA`] table.

use fixed::types::U16F16;

/// Number of independently powered frame sections
pub const SECTIONS: usize = 4;

/// Cumulative fine gain reduction in fine-gain units, per step
///
/// Nondecreasing. A stage starting at offset `o` applies `FINE_DELTA[o + j]`
/// at its `j`-th step.
pub const FINE_DELTA: [u8; 32] = [
    0, 3, 6, 9, 12, 15, 17, 19, 21, 23, 25, 27, 29, 31, 32, 33, 34, 35, 36, 37, 38, 39, 40, 41,
    42, 43, 44, 45, 46, 47, 48, 49,
];

/// Highest fine gain value
const FINE_MAX: u8 = 0x3F;

/// Output power change per index step, in 0.01 dB
const STEP_CENTI_DB: u32 = 25;

/// A boost is reached once within this many 0.01 dB of the target
const BOOST_MARGIN_CENTI_DB: u32 = 12;

/// One coarse gain stage of a power table
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct CoarseStage {
    /// Coarse gain code
    pub coarse: u8,
    /// Where in [`FINE_DELTA`] the stage starts
    pub lut_offset: u8,
    /// Number of indexes the stage covers
    pub steps: u8,
}

/// Power table for one PLL bias trim
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PowerLut {
    /// The PLL bias trim the table was measured with
    pub pll_bias: u8,
    /// Coarse stages, from highest to lowest power
    pub stages: &'static [CoarseStage],
}

/// Channel 5 tables
pub static CH5_TABLES: [PowerLut; 2] = [
    PowerLut {
        pll_bias: 7,
        stages: &[
            CoarseStage { coarse: 2, lut_offset: 0, steps: 16 },
            CoarseStage { coarse: 1, lut_offset: 2, steps: 30 },
        ],
    },
    PowerLut {
        pll_bias: 4,
        stages: &[CoarseStage { coarse: 0, lut_offset: 8, steps: 24 }],
    },
];

/// Channel 9 tables
pub static CH9_TABLES: [PowerLut; 2] = [
    PowerLut {
        pll_bias: 7,
        stages: &[
            CoarseStage { coarse: 2, lut_offset: 0, steps: 10 },
            CoarseStage { coarse: 1, lut_offset: 0, steps: 32 },
        ],
    },
    PowerLut {
        pll_bias: 4,
        stages: &[CoarseStage { coarse: 0, lut_offset: 8, steps: 24 }],
    },
];

/// Errors of the power engine
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerError {
    /// The index is past the end of the channel's tables
    IndexOutOfRange(u8),
    /// The register value is neither in the tables nor between two entries
    /// of the same coarse gain
    NotInTable(u8),
    /// The boost is above what the channel allows
    BoostTooHigh {
        /// The largest boost for the channel, in 0.1 dB
        max: u16,
    },
    /// The index range ran out before the boost was reached
    BoostNotReachable {
        /// The unmodified reference power
        reference: u32,
    },
}

/// Per-section power indexes
///
/// Sections are, in register order: payload, PHY header, preamble/SFD, STS.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PowerIndexes {
    /// Requested index per section
    pub input: [u8; SECTIONS],
    /// Index applied per section, filled in by [`calculate_linear_tx_power`]
    pub output: [u8; SECTIONS],
}

impl PowerIndexes {
    /// The same index for every section
    pub fn uniform(index: u8) -> Self {
        PowerIndexes {
            input: [index; SECTIONS],
            output: [0; SECTIONS],
        }
    }
}

/// Result of a power calculation
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxAdjustment {
    /// Value for the `TX_POWER` register
    pub tx_power_setting: u32,
    /// PLL bias trim that goes with it
    pub pll_bias: u8,
}

/// Result of a boost calculation
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TxBoost {
    /// The adjusted power
    pub adjustment: TxAdjustment,
    /// The boost actually applied, in 0.1 dB
    pub applied_boost: u16,
    /// Steps taken within a coarse stage
    pub fine_steps: u8,
    /// Steps that crossed into the next coarse stage
    pub coarse_steps: u8,
}

/// An index resolved against a channel's tables
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct Position {
    table: usize,
    stage: usize,
    /// Index of the stage's first step
    stage_start: u8,
    /// Step within the stage
    step: u8,
}

fn locate(tables: &[PowerLut], index: u8) -> Option<Position> {
    let mut start = 0u16;
    for (t, table) in tables.iter().enumerate() {
        for (s, stage) in table.stages.iter().enumerate() {
            let end = start + stage.steps as u16;
            if (index as u16) < end {
                return Some(Position {
                    table: t,
                    stage: s,
                    stage_start: start as u8,
                    step: index - start as u8,
                });
            }
            start = end;
        }
    }
    None
}

fn stage_at(tables: &[PowerLut], pos: Position) -> &CoarseStage {
    &tables[pos.table].stages[pos.stage]
}

fn byte_at(stage: &CoarseStage, step: u8) -> u8 {
    let fine = FINE_MAX - FINE_DELTA[(stage.lut_offset + step) as usize];
    (fine << 2) | (stage.coarse & 0x3)
}

/// Number of indexes the tables cover
pub fn index_count(tables: &[PowerLut]) -> u16 {
    tables
        .iter()
        .flat_map(|t| t.stages.iter())
        .map(|s| s.steps as u16)
        .sum()
}

/// Returns the `TX_POWER` byte for one index
pub fn index_to_tx_power(tables: &[PowerLut], index: u8) -> Result<u8, PowerError> {
    let pos = locate(tables, index).ok_or(PowerError::IndexOutOfRange(index))?;
    Ok(byte_at(stage_at(tables, pos), pos.step))
}

/// Finds the index of a `TX_POWER` byte
///
/// Values between two entries of the same coarse gain are interpolated and
/// rounded to the nearest index.
pub fn convert_tx_power_to_index(tables: &[PowerLut], tx_power: u8) -> Result<u8, PowerError> {
    let coarse = tx_power & 0x3;
    let fine = tx_power >> 2;

    let mut start = 0u8;
    for table in tables {
        for stage in table.stages {
            if stage.coarse == coarse {
                for step in 0..stage.steps {
                    let here = byte_at(stage, step) >> 2;
                    if here == fine {
                        return Ok(start + step);
                    }
                    if step + 1 < stage.steps {
                        let next = byte_at(stage, step + 1) >> 2;
                        if here > fine && fine > next {
                            let frac = U16F16::from_num(here - fine) / U16F16::from_num(here - next);
                            let index = (U16F16::from_num(start + step) + frac).round();
                            return Ok(index.to_num::<u8>());
                        }
                    }
                }
            }
            start += stage.steps;
        }
    }

    Err(PowerError::NotInTable(tx_power))
}

/// Turns per-section power indexes into a `TX_POWER` setting
///
/// The section asking for the most power picks the table and coarse stage.
/// The other sections step within that stage, clamped to its last step.
/// `indexes.output` records the index each section ends up with.
pub fn calculate_linear_tx_power(
    tables: &[PowerLut],
    indexes: &mut PowerIndexes,
) -> Result<TxAdjustment, PowerError> {
    let reference = indexes.input.iter().copied().min().unwrap_or(0);
    let pos = locate(tables, reference).ok_or(PowerError::IndexOutOfRange(reference))?;
    let stage = stage_at(tables, pos);
    let last = stage.steps - 1;

    let mut setting = 0u32;
    for (section, &input) in indexes.input.iter().enumerate() {
        let step = (input - pos.stage_start).min(last);
        indexes.output[section] = pos.stage_start + step;
        setting |= (byte_at(stage, step) as u32) << (8 * section);
    }

    Ok(TxAdjustment {
        tx_power_setting: setting,
        pll_bias: tables[pos.table].pll_bias,
    })
}

/// Raises a reference power by `boost` (in 0.1 dB)
///
/// Steps up from the index of the reference's payload byte until the gain
/// is within 0.12 dB of the requested boost.
pub fn adjust_tx_power(
    tables: &[PowerLut],
    max_boost: u16,
    boost: u16,
    reference: u32,
) -> Result<TxBoost, PowerError> {
    if boost > max_boost {
        return Err(PowerError::BoostTooHigh { max: max_boost });
    }

    let start = convert_tx_power_to_index(tables, reference as u8)?;
    let target = u32::from(boost) * 10;

    let mut index = start;
    let mut gained = 0u32;
    let mut fine_steps = 0;
    let mut coarse_steps = 0;

    while target.saturating_sub(gained) > BOOST_MARGIN_CENTI_DB {
        if index == 0 {
            debug!("boost of {} not reachable from index {}", boost, start);
            return Err(PowerError::BoostNotReachable { reference });
        }

        let from = locate(tables, index).ok_or(PowerError::IndexOutOfRange(index))?;
        index -= 1;
        if from.step == 0 {
            coarse_steps += 1;
        } else {
            fine_steps += 1;
        }
        gained += STEP_CENTI_DB;
    }

    let adjustment = calculate_linear_tx_power(tables, &mut PowerIndexes::uniform(index))?;
    Ok(TxBoost {
        adjustment,
        applied_boost: (gained / 10) as u16,
        fine_steps,
        coarse_steps,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel5_index5() {
        assert_eq!(convert_tx_power_to_index(&CH5_TABLES, 0xC2), Ok(5));

        let mut indexes = PowerIndexes::uniform(5);
        let adj = calculate_linear_tx_power(&CH5_TABLES, &mut indexes).unwrap();
        assert_eq!(adj.tx_power_setting, 0xC2C2_C2C2);
        assert_eq!(adj.pll_bias, 7);
        assert_eq!(indexes.output, [5; SECTIONS]);
    }

    #[test]
    fn known_register_values_convert() {
        let ch5 = [
            0x5d, 0x61, 0x65, 0x69, 0x6d, 0x71, 0x75, 0x79, 0x7d, 0x85, 0x9d,
        ];
        let ch9 = [
            0x79, 0x7d, 0x85, 0x91, 0x95, 0x99, 0x9d, 0xa1, 0xa5, 0xa9, 0xad, 0xb1, 0xb5, 0xb9,
            0xc1,
        ];

        for (tables, values) in [(&CH5_TABLES, &ch5[..]), (&CH9_TABLES, &ch9[..])] {
            for &value in values {
                let index = convert_tx_power_to_index(tables, value).unwrap();
                let mut indexes = PowerIndexes::uniform(index);
                calculate_linear_tx_power(tables, &mut indexes).unwrap();
            }
        }
    }

    #[test]
    fn inverse_of_table_entries_is_exact() {
        for tables in [&CH5_TABLES, &CH9_TABLES] {
            // Every stage of a channel has its own coarse gain, so every
            // byte is unique
            for index in 0..index_count(tables) as u8 {
                let value = index_to_tx_power(tables, index).unwrap();
                assert_eq!(convert_tx_power_to_index(tables, value), Ok(index));
            }
        }
    }

    #[test]
    fn interpolates_between_same_coarse_entries() {
        // Channel 5, coarse 2: fine 51 sits at index 4, fine 48 at 5
        assert_eq!(index_to_tx_power(&CH5_TABLES, 4), Ok((51 << 2) | 2));
        assert_eq!(index_to_tx_power(&CH5_TABLES, 5), Ok((48 << 2) | 2));
        assert_eq!(convert_tx_power_to_index(&CH5_TABLES, (50 << 2) | 2), Ok(4));
        assert_eq!(convert_tx_power_to_index(&CH5_TABLES, (49 << 2) | 2), Ok(5));

        // No coarse-3 stage anywhere
        assert_eq!(
            convert_tx_power_to_index(&CH5_TABLES, 0xFF),
            Err(PowerError::NotInTable(0xFF))
        );
    }

    #[test]
    fn channel9_stage_boundaries() {
        // Last coarse-2 step, first coarse-1 step
        assert_eq!(index_to_tx_power(&CH9_TABLES, 9), Ok((40 << 2) | 2));
        assert_eq!(index_to_tx_power(&CH9_TABLES, 10), Ok((63 << 2) | 1));
        assert_eq!(convert_tx_power_to_index(&CH9_TABLES, (40 << 2) | 2), Ok(9));
        assert_eq!(convert_tx_power_to_index(&CH9_TABLES, (63 << 2) | 1), Ok(10));

        // Last step of the high bias table, first of the low bias one
        assert_eq!(convert_tx_power_to_index(&CH9_TABLES, (14 << 2) | 1), Ok(41));
        assert_eq!(convert_tx_power_to_index(&CH9_TABLES, 42 << 2), Ok(42));
        assert_eq!(convert_tx_power_to_index(&CH9_TABLES, 14 << 2), Ok(65));

        // Past the end of a stage there is nothing to interpolate against
        assert_eq!(
            convert_tx_power_to_index(&CH9_TABLES, (39 << 2) | 2),
            Err(PowerError::NotInTable((39 << 2) | 2))
        );
        // Between the first two coarse-1 steps, fine 63 and 60
        assert_eq!(convert_tx_power_to_index(&CH9_TABLES, (62 << 2) | 1), Ok(10));
        assert_eq!(convert_tx_power_to_index(&CH9_TABLES, (61 << 2) | 1), Ok(11));
    }

    #[test]
    fn power_never_increases_with_index() {
        for tables in [&CH5_TABLES, &CH9_TABLES] {
            let mut previous = None;
            for index in 0..index_count(tables) as u8 {
                let value = index_to_tx_power(tables, index).unwrap();
                let key = (value & 0x3, value >> 2);
                if let Some(previous) = previous {
                    assert!(key <= previous, "index {} raised the power", index);
                }
                previous = Some(key);
            }
        }
    }

    #[test]
    fn strongest_section_picks_the_stage() {
        let mut indexes = PowerIndexes {
            input: [20, 40, 3, 14],
            output: [0; SECTIONS],
        };
        let adj = calculate_linear_tx_power(&CH5_TABLES, &mut indexes).unwrap();

        // Index 3 is in the first stage, which ends at 15
        assert_eq!(indexes.output, [15, 15, 3, 14]);
        assert_eq!(adj.pll_bias, 7);
        assert_eq!((adj.tx_power_setting >> 16) as u8, index_to_tx_power(&CH5_TABLES, 3).unwrap());
    }

    #[test]
    fn low_power_uses_low_bias_table() {
        let mut indexes = PowerIndexes::uniform(50);
        let adj = calculate_linear_tx_power(&CH5_TABLES, &mut indexes).unwrap();
        assert_eq!(adj.pll_bias, 4);
        assert_eq!(adj.tx_power_setting & 0x3, 0);

        let count = index_count(&CH5_TABLES) as u8;
        assert_eq!(
            calculate_linear_tx_power(&CH5_TABLES, &mut PowerIndexes::uniform(count)),
            Err(PowerError::IndexOutOfRange(count))
        );
    }

    #[test]
    fn boost_steps_up_from_reference() {
        // Index 20 on channel 5, boost by 3 dB: 12 steps of 0.25 dB
        let reference = index_to_tx_power(&CH5_TABLES, 20).unwrap() as u32;
        let boost = adjust_tx_power(&CH5_TABLES, 354, 30, reference).unwrap();

        assert_eq!(boost.applied_boost, 30);
        assert_eq!(
            boost.adjustment.tx_power_setting as u8,
            index_to_tx_power(&CH5_TABLES, 8).unwrap()
        );
        // 20 -> 16 stays in the coarse-1 stage, 16 -> 15 crosses into coarse 2
        assert_eq!(boost.coarse_steps, 1);
        assert_eq!(boost.fine_steps, 11);
    }

    #[test]
    fn boost_limits() {
        let reference = index_to_tx_power(&CH5_TABLES, 2).unwrap() as u32;
        assert_eq!(
            adjust_tx_power(&CH5_TABLES, 354, 355, reference),
            Err(PowerError::BoostTooHigh { max: 354 })
        );
        assert_eq!(
            adjust_tx_power(&CH5_TABLES, 354, 30, reference),
            Err(PowerError::BoostNotReachable { reference })
        );
        // A boost whose centi-dB value doesn't fit in 16 bits
        assert_eq!(
            adjust_tx_power(&CH5_TABLES, u16::MAX, 7000, reference),
            Err(PowerError::BoostNotReachable { reference })
        );
        // Zero boost is reached without moving
        let boost = adjust_tx_power(&CH5_TABLES, 354, 0, reference).unwrap();
        assert_eq!(boost.applied_boost, 0);
        assert_eq!(boost.adjustment.tx_power_setting as u8, reference as u8);
    }
}
