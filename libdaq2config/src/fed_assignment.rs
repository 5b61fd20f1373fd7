//! Deterministic mapping of FED ids to FEROL slots, RU ownership, eFED crate
//! slots and FMM card masks.

use std::ops::Range;

use super::constants::{FED_ID_BASE, FMM_GEOSLOTS, FMM_LABELS, MAX_FMM_CARDS, NUM_FED_IDS};
use super::error::AssignmentError;
use super::topology::TopologyParams;

/// Partition `0..len` into `parts` contiguous groups whose sizes differ by at
/// most one, the remainder going to the earliest groups. This is the single
/// load-balancing policy used wherever FEROLs or FEDs are grouped.
pub fn split_range(len: usize, parts: usize) -> Vec<Range<usize>> {
    assert!(parts > 0, "cannot split {len} items into zero groups");
    let base = len / parts;
    let remainder = len % parts;
    let mut ranges = Vec::with_capacity(parts);
    let mut start = 0;
    for part in 0..parts {
        let size = base + usize::from(part < remainder);
        ranges.push(start..start + size);
        start += size;
    }
    ranges
}

/// One FMM card configuration derived from the FED layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FmmCard {
    pub geoslot: u32,
    pub input_mask: String,
    pub input_labels: String,
    pub output_labels: String,
    pub label: String,
}

/// The FED id layout of a FEROL-based topology.
#[derive(Debug, Clone)]
pub struct FedAssignment {
    n_ferols: u32,
    streams_per_ferol: u32,
    n_rus: u32,
    base: u32,
}

impl FedAssignment {
    pub fn new(params: &TopologyParams) -> Self {
        Self::with_base(params, FED_ID_BASE)
    }

    /// The production cabling reserves its block starting at 901.
    pub fn with_base(params: &TopologyParams, base: u32) -> Self {
        FedAssignment {
            n_ferols: params.n_ferols,
            streams_per_ferol: params.streams_per_ferol,
            n_rus: params.n_rus,
            base,
        }
    }

    /// The FED id pair wired to a FEROL slot, in increasing slot order.
    pub fn fed_ids_for_ferol(&self, ferol_index: u32) -> (u32, u32) {
        debug_assert!(2 * ferol_index + 1 < NUM_FED_IDS || self.base != FED_ID_BASE);
        (self.base + 2 * ferol_index, self.base + 2 * ferol_index + 1)
    }

    /// FEROL index range assigned to an RU.
    pub fn ferols_for_ru(&self, ru_index: u32) -> Range<usize> {
        split_range(self.n_ferols as usize, self.n_rus as usize)[ru_index as usize].clone()
    }

    /// The RU owning a FEROL.
    pub fn ru_for_ferol(&self, ferol_index: u32) -> u32 {
        split_range(self.n_ferols as usize, self.n_rus as usize)
            .iter()
            .position(|r| r.contains(&(ferol_index as usize)))
            .expect("ferol index within range") as u32
    }

    /// All FED ids owned by an RU, in slot order. With a single stream per
    /// FEROL only the even-indexed id of each pair is wired.
    pub fn fed_ids_for_ru(&self, ru_index: u32) -> Vec<u32> {
        let mut fedids = Vec::new();
        for ferol in self.ferols_for_ru(ru_index) {
            let (fed0, fed1) = self.fed_ids_for_ferol(ferol as u32);
            fedids.push(fed0);
            if self.streams_per_ferol == 2 {
                fedids.push(fed1);
            }
        }
        fedids
    }

    /// The full FED id set of the topology, RU by RU.
    pub fn all_fed_ids(&self) -> Vec<u32> {
        (0..self.n_rus)
            .flat_map(|ru| self.fed_ids_for_ru(ru))
            .collect()
    }

    /// Crate-relative eFED slot of a FED id. The three crates cover the id
    /// ranges below base+8, base+8..base+16 and base+16..base+24.
    pub fn efed_slot(&self, fed: u32) -> Result<u32, AssignmentError> {
        let n = fed - self.base;
        match n {
            0..=7 => Ok(2 * (n + 1)),
            8..=15 => Ok(2 * (n + 1) - 16),
            16..=23 => Ok(2 * (n + 1) - 32),
            _ => Err(AssignmentError::TooManyCrates(fed)),
        }
    }

    /// FED ids grouped by eFED crate, each with its crate-relative slot.
    /// Empty crates are dropped.
    pub fn efed_groups(&self) -> Result<Vec<Vec<(u32, u32)>>, AssignmentError> {
        let mut groups: [Vec<(u32, u32)>; 3] = Default::default();
        for fed in self.all_fed_ids() {
            let slot = self.efed_slot(fed)?;
            groups[((fed - self.base) / 8) as usize].push((fed, slot));
        }
        Ok(groups.into_iter().filter(|g| !g.is_empty()).collect())
    }

    /// Build the FMM card list: FED ids split over the cards, input labels
    /// and enable mask derived from the per-card layout.
    pub fn fmm_cards(&self, n_cards: usize) -> Result<Vec<FmmCard>, AssignmentError> {
        if n_cards > MAX_FMM_CARDS {
            return Err(AssignmentError::TooManyCards(n_cards));
        }
        let all_feds = self.all_fed_ids();
        let groups = split_range(all_feds.len(), n_cards);

        let mut cards = Vec::with_capacity(n_cards);
        for (n, group) in groups.iter().enumerate() {
            let feds = &all_feds[group.clone()];
            cards.push(FmmCard {
                geoslot: FMM_GEOSLOTS[n],
                input_mask: format!("{:#x}", input_mask(&self.input_tokens(feds))),
                input_labels: self.input_tokens(feds).join(";"),
                output_labels: format!("GTPe:{n};N/C;N/C;N/C"),
                label: FMM_LABELS[n].to_string(),
            });
        }
        Ok(cards)
    }

    /// The 20 input-label tokens of one card. Single-stream cards alternate
    /// FED slots with unconnected inputs; dual-stream cards pack 19 slots.
    fn input_tokens(&self, feds: &[u32]) -> Vec<String> {
        let slots = if self.streams_per_ferol == 1 { 10 } else { 19 };
        let mut labels: Vec<String> = feds.iter().map(u32::to_string).collect();
        labels.resize(slots, "N/C".to_string());

        let mut tokens = vec!["N/C".to_string()];
        if self.streams_per_ferol == 1 {
            for (i, label) in labels.into_iter().enumerate() {
                tokens.push(label);
                if i < 9 {
                    tokens.push("N/C".to_string());
                }
            }
        } else {
            tokens.extend(labels);
        }
        tokens
    }
}

/// One bit per connected input, scanned right to left so the first token is
/// the least significant bit.
fn input_mask(tokens: &[String]) -> u32 {
    tokens
        .iter()
        .rev()
        .fold(0u32, |mask, t| (mask << 1) | u32::from(t != "N/C"))
}

/// The card written when GTPe triggering runs without FED emulators.
pub fn empty_fmm_card() -> FmmCard {
    FmmCard {
        geoslot: 5,
        input_mask: "0x400".to_string(),
        input_labels: "N/C;N/C;N/C;N/C;N/C;N/C;N/C;N/C;N/C;N/C;950;N/C;N/C;N/C;N/C;N/C;N/C;N/C;N/C;N/C".to_string(),
        output_labels: "GTPe:3;N/C;N/C;N/C".to_string(),
        label: "CSC_EFED".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(n_ferols: u32, streams_per_ferol: u32, n_rus: u32) -> TopologyParams {
        TopologyParams {
            n_ferols,
            streams_per_ferol,
            n_rus,
            n_bus: 2,
        }
    }

    #[test]
    fn test_split_range_remainder_to_earliest() {
        let ranges = split_range(8, 3);
        assert_eq!(ranges, vec![0..3, 3..6, 6..8]);
        let ranges = split_range(8, 4);
        assert_eq!(ranges, vec![0..2, 2..4, 4..6, 6..8]);
    }

    #[test]
    #[should_panic(expected = "zero groups")]
    fn test_split_range_zero_parts() {
        split_range(4, 0);
    }

    #[test]
    fn test_split_range_balance_bound() {
        for len in 1..40 {
            for parts in 1..=len {
                let sizes: Vec<usize> = split_range(len, parts).iter().map(|r| r.len()).collect();
                let min = sizes.iter().min().unwrap();
                let max = sizes.iter().max().unwrap();
                assert!(max - min <= 1, "len {len} parts {parts}: {sizes:?}");
                assert_eq!(sizes.iter().sum::<usize>(), len);
            }
        }
    }

    #[test]
    fn test_fed_ids_complete_and_disjoint() {
        for (n_ferols, streams, n_rus) in [(8, 2, 1), (8, 2, 4), (8, 1, 3), (12, 2, 2), (16, 1, 4)] {
            let assignment = FedAssignment::new(&params(n_ferols, streams, n_rus));
            let all = assignment.all_fed_ids();
            assert_eq!(all.len() as u32, n_ferols * streams);
            let mut sorted = all.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), all.len(), "duplicate fed ids");
        }
    }

    #[test]
    fn test_single_stream_takes_even_ids() {
        let assignment = FedAssignment::new(&params(4, 1, 1));
        assert_eq!(assignment.fed_ids_for_ru(0), vec![900, 902, 904, 906]);
    }

    #[test]
    fn test_dual_stream_slot_order() {
        let assignment = FedAssignment::new(&params(8, 2, 1));
        assert_eq!(
            assignment.fed_ids_for_ru(0),
            (900..916).collect::<Vec<u32>>()
        );
    }

    #[test]
    fn test_ru_ownership_matches_grouping() {
        let assignment = FedAssignment::new(&params(8, 2, 4));
        // 8 ferols on 4 RUs: 0,0,1,1,2,2,3,3
        let owners: Vec<u32> = (0..8).map(|f| assignment.ru_for_ferol(f)).collect();
        assert_eq!(owners, vec![0, 0, 1, 1, 2, 2, 3, 3]);
        for ru in 0..4 {
            for ferol in assignment.ferols_for_ru(ru) {
                assert_eq!(assignment.ru_for_ferol(ferol as u32), ru);
            }
        }
    }

    #[test]
    fn test_efed_slots() {
        let assignment = FedAssignment::new(&params(16, 2, 2));
        assert_eq!(assignment.efed_slot(900).unwrap(), 2);
        assert_eq!(assignment.efed_slot(907).unwrap(), 16);
        assert_eq!(assignment.efed_slot(908).unwrap(), 2);
        assert_eq!(assignment.efed_slot(915).unwrap(), 16);
        assert_eq!(assignment.efed_slot(916).unwrap(), 2);
        assert_eq!(assignment.efed_slot(923).unwrap(), 16);
        assert!(matches!(
            assignment.efed_slot(924),
            Err(AssignmentError::TooManyCrates(924))
        ));
    }

    #[test]
    fn test_efed_groups_drop_empty_crates() {
        let assignment = FedAssignment::new(&params(4, 2, 1));
        let groups = assignment.efed_groups().unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 8);
        assert_eq!(groups[0][0], (900, 2));
    }

    #[test]
    fn test_fmm_input_mask_single_stream() {
        // 4 feds alternating with N/C inputs: bits 1,3,5,7 -> 0xaa
        let assignment = FedAssignment::new(&params(8, 1, 2));
        let cards = assignment.fmm_cards(2).unwrap();
        assert_eq!(cards[0].input_mask, "0xaa");
        assert_eq!(cards[0].geoslot, 5);
        assert_eq!(cards[0].label, "CSC_EFED");
        assert!(cards[0].input_labels.starts_with("N/C;900;N/C;902;"));
        assert_eq!(cards[1].output_labels, "GTPe:1;N/C;N/C;N/C");
    }

    #[test]
    fn test_fmm_card_count_limit() {
        let assignment = FedAssignment::new(&params(8, 1, 2));
        assert!(matches!(
            assignment.fmm_cards(4),
            Err(AssignmentError::TooManyCards(4))
        ));
    }

    #[test]
    fn test_fmm_token_count() {
        for streams in [1, 2] {
            let assignment = FedAssignment::new(&params(8, streams, 1));
            for card in assignment.fmm_cards(3).unwrap() {
                assert_eq!(card.input_labels.split(';').count(), 20);
            }
        }
    }
}
