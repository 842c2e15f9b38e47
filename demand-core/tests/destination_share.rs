use std::collections::BTreeMap;

use demand_core::calibration::CalibrationFactors;
use demand_core::coefficients::CoefficientTable;
use demand_core::destination::{DestinationMatrices, UtilityMatrix};
use demand_core::executor::{FailurePolicy, PartitionedExecutor};
use demand_core::models::distribution::DistributionModel;
use demand_core::models::mode_choice::{ModeChoiceModel, ModeChoiceSettings};
use demand_core::population::{
    AreaType, Household, Mode, ModeRestriction, Person, Purpose, Trip, Zone, ZoneId, Zones,
};
use demand_core::travel_times::{SkimMatrix, SkimTravelTimes};
use demand_core::utility::{GeneralizedCostCalculator, REQUIRED_VARIABLES, TRIP_VARIABLES};
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

#[test]
fn destination_share_over_many_seeds() {
    let ids: Vec<ZoneId> = (1..=10).collect();
    let zones = Zones::new(
        ids.iter()
            .map(|&id| Zone {
                id,
                region: "center".to_owned(),
                area_type: AreaType::Urban,
                distance_to_transit: 100.0,
                attractions: [1.0; Purpose::COUNT],
            })
            .collect(),
    )
    .unwrap();
    // From any origin, 90% of the weight goes to zone 7, the rest is spread evenly.
    let row: Vec<f64> = ids
        .iter()
        .map(|&id| if id == 7 { 0.9 } else { 0.1 / 9.0 })
        .collect();
    let mut matrices = DestinationMatrices::default();
    matrices.insert(
        Purpose::HBS,
        None,
        UtilityMatrix::from_rows(ids.clone(), vec![row; ids.len()]).unwrap(),
    );
    let distances = SkimMatrix::from_fn(&ids, |o, d| if o == d { 0.5 } else { 2.0 }).unwrap();
    let speeds = Mode::ALL.into_iter().map(|m| (m, 10.0)).collect();
    let travel_times = SkimTravelTimes::new(Default::default(), distances.clone(), speeds).unwrap();
    let mut table = CoefficientTable::new("mode_choice_hbs");
    for mode in Mode::ALL {
        for var in REQUIRED_VARIABLES.iter().chain(TRIP_VARIABLES.iter()) {
            table.insert(mode.as_str(), var, 0.0).unwrap();
        }
    }
    let settings = ModeChoiceSettings::new(
        [(Purpose::HBS, table)].into_iter().collect(),
        BTreeMap::new(),
        GeneralizedCostCalculator::default(),
        480.0,
    )
    .unwrap();
    let factors = CalibrationFactors::default();
    let distribution = DistributionModel::new(&zones, &matrices);
    let mode_choice = ModeChoiceModel::new(&zones, &settings, &distances, &travel_times, &factors);
    let executor = PartitionedExecutor::new(1, 1, FailurePolicy::FailFast).unwrap();

    let nb_runs = 1000;
    let mut nb_zone_7 = 0;
    for seed in 0..nb_runs {
        let mut person = Person::new(1, 35);
        person.mode_restriction = Some(ModeRestriction::CycleWalk);
        person.trips = vec![Trip::new(1, Purpose::HBS)];
        let mut households = vec![Household {
            id: 1,
            home_zone: 3,
            vehicles: 1,
            economic_status: 2,
            persons: vec![person],
        }];
        let mut master = XorShiftRng::seed_from_u64(seed);
        distribution
            .run(&executor, &mut households, Purpose::HBS, &mut master)
            .unwrap();
        mode_choice
            .run(&executor, &mut households, &mut master)
            .unwrap();
        let trip = &households[0].persons[0].trips[0];
        assert_eq!(trip.origin(), Some(3));
        assert!(matches!(trip.mode(), Some(Mode::Walk | Mode::Bicycle)));
        if trip.destination() == Some(7) {
            nb_zone_7 += 1;
        }
    }
    let share = nb_zone_7 as f64 / nb_runs as f64;
    assert!((0.85..=0.95).contains(&share), "share of zone 7: {share}");
}
