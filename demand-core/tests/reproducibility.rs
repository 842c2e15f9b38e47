use std::collections::BTreeMap;

use demand_core::calibration::CalibrationFactors;
use demand_core::coefficients::CoefficientTable;
use demand_core::destination::GompertzParameters;
use demand_core::executor::{FailurePolicy, PartitionedExecutor};
use demand_core::models::mode_choice::ModeChoiceSettings;
use demand_core::parameters::PurposeDistributionParameters;
use demand_core::pipeline::DemandModel;
use demand_core::population::{
    AreaType, CarOwnership, Household, Mode, Occupation, Person, Population, Purpose, Trip, Zone,
    ZoneId, Zones,
};
use demand_core::travel_times::{SkimMatrix, SkimTravelTimes};
use demand_core::utility::{GeneralizedCostCalculator, REQUIRED_VARIABLES, TRIP_VARIABLES};

const NB_ZONES: ZoneId = 12;

fn zones() -> Zones {
    Zones::new(
        (0..NB_ZONES)
            .map(|id| Zone {
                id,
                region: if id < 6 { "west" } else { "east" }.to_owned(),
                area_type: if id % 3 == 0 {
                    AreaType::Rural
                } else {
                    AreaType::Urban
                },
                distance_to_transit: 200.0 * id as f64,
                attractions: [1.0 + (id % 4) as f64; Purpose::COUNT],
            })
            .collect(),
    )
    .unwrap()
}

fn coefficients() -> CoefficientTable {
    let mut table = CoefficientTable::new("mode_choice");
    for (i, mode) in Mode::ALL.iter().enumerate() {
        for var in REQUIRED_VARIABLES.iter().chain(TRIP_VARIABLES.iter()) {
            table.insert(mode.as_str(), var, 0.0).unwrap();
        }
        table
            .insert(mode.as_str(), "intercept", 0.2 * i as f64)
            .unwrap();
        table
            .insert(mode.as_str(), "t_generalized_cost", -0.05)
            .unwrap();
        table
            .insert(mode.as_str(), "hh_size", 0.1 * i as f64)
            .unwrap();
    }
    table
}

fn model(nb_threads: usize, nb_partitions: usize, random_seed: u64) -> DemandModel {
    let zones = zones();
    let ids = zones.ids();
    let distances =
        SkimMatrix::from_fn(&ids, |o, d| 0.5 + (o as f64 - d as f64).abs()).unwrap();
    let speeds = [
        (Mode::AutoDriver, 40.0),
        (Mode::AutoPassenger, 40.0),
        (Mode::PublicTransport, 20.0),
        (Mode::Bicycle, 15.0),
        (Mode::Walk, 5.0),
    ]
    .into_iter()
    .collect();
    let travel_times = SkimTravelTimes::new(Default::default(), distances.clone(), speeds).unwrap();
    let table = coefficients();
    let mode_choice = ModeChoiceSettings::new(
        Purpose::ALL.into_iter().map(|p| (p, table.clone())).collect(),
        BTreeMap::new(),
        GeneralizedCostCalculator::new(
            [(Mode::AutoDriver, 0.3)].into_iter().collect(),
            Purpose::ALL
                .into_iter()
                .map(|p| (p, [0.1, 0.2, 0.3, 0.4]))
                .collect(),
        ),
        480.0,
    )
    .unwrap();
    let distribution = Purpose::ALL
        .into_iter()
        .map(|p| {
            (
                p,
                PurposeDistributionParameters {
                    impedance: -0.5,
                    distance: 0.2,
                    car_ownership: [(
                        CarOwnership::NoCar,
                        GompertzParameters {
                            impedance: -1.0,
                            distance: 0.3,
                        },
                    )]
                    .into_iter()
                    .collect(),
                },
            )
        })
        .collect();
    DemandModel {
        zones,
        distances: Box::new(distances),
        travel_times: Box::new(travel_times),
        executor: PartitionedExecutor::new(nb_threads, nb_partitions, FailurePolicy::FailFast)
            .unwrap(),
        distribution,
        mode_choice,
        mode_restriction: None,
        calibration: None,
        factors: CalibrationFactors::default(),
        random_seed,
    }
}

fn population() -> Population {
    let mut trip_id = 0;
    let households = (0..200)
        .map(|i| {
            let persons = (0..1 + i % 3)
                .map(|j| {
                    let mut person = Person::new(10 * i + j, 15 + 10 * j as u32);
                    person.has_driver_license = j > 0;
                    if j == 1 {
                        person.occupation = Occupation::Worker;
                        person.occupation_zone = Some(((i + 5) % NB_ZONES as u64) as ZoneId);
                    }
                    person.trips = Purpose::ALL
                        .into_iter()
                        .filter(|p| (i + p.index() as u64) % 2 == 0)
                        .map(|p| {
                            trip_id += 1;
                            Trip::new(trip_id, p)
                        })
                        .collect();
                    person
                })
                .collect();
            Household {
                id: i,
                home_zone: (i % NB_ZONES as u64) as ZoneId,
                vehicles: (i % 3) as u32,
                economic_status: (1 + i % 4) as u8,
                persons,
            }
        })
        .collect();
    Population::new(households).unwrap()
}

type Assignment = Vec<(u64, Option<ZoneId>, Option<ZoneId>, Option<Mode>)>;

fn run(model: &DemandModel) -> Assignment {
    let mut population = population();
    model
        .run(&mut population, None::<&mut csv::Writer<Vec<u8>>>)
        .unwrap();
    population
        .trips()
        .map(|(_, _, t)| (t.id(), t.origin(), t.destination(), t.mode()))
        .collect()
}

#[test]
fn same_seed_same_results() {
    let first = run(&model(1, 8, 42));
    let second = run(&model(4, 8, 42));
    assert_eq!(first, second);
    assert!(first
        .iter()
        .all(|(_, o, d, m)| o.is_some() && d.is_some() && m.is_some()));
}

#[test]
fn different_seed_different_results() {
    let first = run(&model(2, 8, 42));
    let second = run(&model(2, 8, 43));
    assert_ne!(first, second);
}
