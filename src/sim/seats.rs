//! Seat static data

use crate::error::{ForecastError, Result};
use crate::sim::regions::RegionList;
use crate::types::{OddsTriple, PartyId, PartyList, RegionId, SeatId};
use serde::{Deserialize, Serialize};

/// Two-candidate-preferred tallies from one reporting booth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoothTally {
    pub name: String,
    pub first_votes: f64,
    pub second_votes: f64,
}

/// Partial live results for a seat on election night.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveCount {
    /// Candidates in the two-candidate-preferred count
    pub first: PartyId,
    pub second: PartyId,
    pub booths: Vec<BoothTally>,
    pub enrolment: f64,
}

impl LiveCount {
    /// Summed two-candidate tallies across reporting booths.
    pub fn totals(&self) -> (f64, f64) {
        self.booths.iter().fold((0.0, 0.0), |(a, b), booth| {
            (a + booth.first_votes, b + booth.second_votes)
        })
    }

    /// Fraction of the enrolment counted so far, in [0, 1].
    pub fn counted_fraction(&self) -> f64 {
        if self.enrolment <= 0.0 {
            return 0.0;
        }
        let (first, second) = self.totals();
        ((first + second) / self.enrolment).clamp(0.0, 1.0)
    }
}

/// One seat's static parameters.
///
/// Whether the seat is a classic two-party contest is a pure function of
/// current incumbent / challenger / live-candidate identity and is never
/// stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub name: String,
    pub incumbent: PartyId,
    pub challenger: PartyId,
    pub challenger2: Option<PartyId>,
    pub region: RegionId,
    /// Incumbent's TPP margin at the last election, in points
    pub margin: f64,
    /// Seat-specific swing adjustment, oriented to the first major party
    pub local_modifier: f64,
    pub odds: Option<OddsTriple>,
    pub live: Option<LiveCount>,
}

impl Seat {
    pub fn new(
        name: impl Into<String>,
        incumbent: PartyId,
        challenger: PartyId,
        region: RegionId,
        margin: f64,
    ) -> Self {
        Self {
            name: name.into(),
            incumbent,
            challenger,
            challenger2: None,
            region,
            margin,
            local_modifier: 0.0,
            odds: None,
            live: None,
        }
    }

    pub fn with_modifier(mut self, modifier: f64) -> Self {
        self.local_modifier = modifier;
        self
    }

    pub fn with_challenger2(mut self, party: PartyId) -> Self {
        self.challenger2 = Some(party);
        self
    }

    pub fn with_odds(mut self, odds: OddsTriple) -> Self {
        self.odds = Some(odds);
        self
    }

    pub fn with_live(mut self, live: LiveCount) -> Self {
        self.live = Some(live);
        self
    }

    /// Classic two-party contest: incumbent and challenger fold to the two
    /// distinct majors, and any live count is between those same two.
    pub fn is_classic(&self, parties: &PartyList) -> bool {
        let inc = parties.fold_to_major(self.incumbent);
        let chal = parties.fold_to_major(self.challenger);
        let majors = [parties.major_one(), parties.major_two()];
        if inc == chal || !majors.contains(&inc) || !majors.contains(&chal) {
            return false;
        }
        match &self.live {
            None => true,
            Some(live) => {
                (live.first == self.incumbent && live.second == self.challenger)
                    || (live.first == self.challenger && live.second == self.incumbent)
            }
        }
    }
}

/// Owning list of seats; ids are indices into this list.
///
/// Degenerate definitions are rejected here, at definition time, so the
/// engine never sees one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeatList {
    seats: Vec<Seat>,
}

impl SeatList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        seat: Seat,
        regions: &RegionList,
        parties: &PartyList,
    ) -> Result<SeatId> {
        if seat.incumbent == seat.challenger {
            return Err(ForecastError::DegenerateSeat(seat.name.clone()));
        }
        parties.get(seat.incumbent)?;
        parties.get(seat.challenger)?;
        if let Some(third) = seat.challenger2 {
            parties.get(third)?;
        }
        regions.get(seat.region)?;
        if let Some(odds) = &seat.odds {
            odds.validate(&seat.name)?;
        }
        self.seats.push(seat);
        Ok(SeatId(self.seats.len() - 1))
    }

    pub fn get(&self, id: SeatId) -> Option<&Seat> {
        self.seats.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.seats.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seats.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (SeatId, &Seat)> {
        self.seats.iter().enumerate().map(|(i, s)| (SeatId(i), s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::regions::Region;
    use crate::types::Party;

    fn fixtures() -> (PartyList, RegionList) {
        let mut parties = PartyList::new();
        parties.add(Party::new("ALP", "Labor"));
        parties.add(Party::new("LNP", "Coalition"));
        parties.add(Party::new("IND", "Independent"));
        let mut regions = RegionList::new();
        regions.add(Region::new("Metro", 1000.0, 51.0, 52.0));
        (parties, regions)
    }

    #[test]
    fn test_degenerate_seat_rejected_at_definition_time() {
        let (parties, regions) = fixtures();
        let mut seats = SeatList::new();
        let seat = Seat::new("Broken", PartyId(0), PartyId(0), RegionId(0), 5.0);
        let err = seats.add(seat, &regions, &parties).unwrap_err();
        assert!(matches!(err, ForecastError::DegenerateSeat(_)));
    }

    #[test]
    fn test_unknown_region_rejected() {
        let (parties, regions) = fixtures();
        let mut seats = SeatList::new();
        let seat = Seat::new("Lost", PartyId(0), PartyId(1), RegionId(4), 5.0);
        assert!(seats.add(seat, &regions, &parties).is_err());
    }

    #[test]
    fn test_classic_is_a_pure_function_of_identity() {
        let (parties, regions) = fixtures();
        let classic = Seat::new("Safe", PartyId(0), PartyId(1), RegionId(0), 8.0);
        assert!(classic.is_classic(&parties));

        let non_classic = Seat::new("Teal", PartyId(1), PartyId(2), RegionId(0), 2.0);
        assert!(!non_classic.is_classic(&parties));

        // A live count between different candidates breaks classic status.
        let live = LiveCount {
            first: PartyId(0),
            second: PartyId(2),
            booths: vec![BoothTally {
                name: "Central".into(),
                first_votes: 900.0,
                second_votes: 800.0,
            }],
            enrolment: 10_000.0,
        };
        let disrupted = Seat::new("Upset", PartyId(0), PartyId(1), RegionId(0), 3.0)
            .with_live(live);
        assert!(!disrupted.is_classic(&parties));
    }

    #[test]
    fn test_live_count_totals_and_fraction() {
        let live = LiveCount {
            first: PartyId(0),
            second: PartyId(1),
            booths: vec![
                BoothTally {
                    name: "East".into(),
                    first_votes: 600.0,
                    second_votes: 400.0,
                },
                BoothTally {
                    name: "West".into(),
                    first_votes: 500.0,
                    second_votes: 500.0,
                },
            ],
            enrolment: 10_000.0,
        };
        assert_eq!(live.totals(), (1100.0, 900.0));
        assert!((live.counted_fraction() - 0.2).abs() < 1e-12);

        let empty = LiveCount {
            first: PartyId(0),
            second: PartyId(1),
            booths: vec![],
            enrolment: 0.0,
        };
        assert_eq!(empty.counted_fraction(), 0.0);
    }
}
