use eyre::{ensure, Result, WrapErr};
use serde::{Deserialize, Serialize};

use crate::gas::constants::*;
use crate::gas::{gas_idx_from_string, register_gas};
use crate::machines::{
	Machine, MachineKind, OutletInjector, PassiveVent, Scrubber, ScrubberPumpDirection,
	ThermoMachine, ThermoMachineMode, VentPressureBound, VentPump, VentPumpDirection,
};
use crate::pipes::PipeId;
use crate::tiles::TileCoord;

/// Definition data for one gas species.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GasPrototype {
	pub id: String,
	pub name: String,
	pub specific_heat: f32,
}

/// The standard station species table.
pub fn standard_gas_definitions() -> Vec<GasPrototype> {
	[
		("o2", "Oxygen", 20.0),
		("n2", "Nitrogen", 20.0),
		("co2", "Carbon Dioxide", 30.0),
		("plasma", "Plasma", 200.0),
		("water_vapor", "Water Vapor", 40.0),
	]
	.into_iter()
	.map(|(id, name, specific_heat)| GasPrototype {
		id: id.to_string(),
		name: name.to_string(),
		specific_heat,
	})
	.collect()
}

/// Registers the standard species table. Safe to call more than once.
/// # Errors
/// If a species clashes with an earlier, different registration.
pub fn register_standard_gases() -> Result<()> {
	for proto in standard_gas_definitions() {
		register_gas(&proto)?;
	}
	Ok(())
}

/// Loads gas species definitions from JSON.
/// # Errors
/// If the JSON is malformed; malformed configuration is fatal, not skipped.
pub fn gas_prototypes_from_json(json: &str) -> Result<Vec<GasPrototype>> {
	serde_json::from_str(json).wrap_err("malformed gas prototype data")
}

/// Definition data for one atmospherics machine, as found in prototype
/// files. Tunables all have sensible defaults so a definition only has to
/// spell out what it changes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MachinePrototype {
	Vent {
		#[serde(default)]
		direction: VentPumpDirection,
		#[serde(default = "default_external_bound")]
		external_bound: f32,
		#[serde(default)]
		internal_bound: f32,
		#[serde(default = "default_true")]
		check_external: bool,
		#[serde(default)]
		check_internal: bool,
	},
	Scrubber {
		#[serde(default)]
		direction: ScrubberPumpDirection,
		#[serde(default = "default_scrubber_volume_rate")]
		volume_rate: f32,
		#[serde(default)]
		wide_net: bool,
		#[serde(default)]
		filter_gases: Vec<String>,
	},
	PassiveVent,
	ThermoMachine {
		#[serde(default)]
		mode: ThermoMachineMode,
		#[serde(default = "default_target_temperature")]
		target_temperature: f32,
		#[serde(default = "default_exchange_capacity")]
		heat_capacity: f32,
		#[serde(default = "default_part_rating")]
		part_rating: f32,
	},
	OutletInjector {
		#[serde(default = "default_injector_volume_rate")]
		volume_rate: f32,
	},
}

fn default_true() -> bool {
	true
}
fn default_external_bound() -> f32 {
	ONE_ATMOSPHERE
}
fn default_scrubber_volume_rate() -> f32 {
	200.0
}
fn default_target_temperature() -> f32 {
	T20C
}
fn default_exchange_capacity() -> f32 {
	THERMOMACHINE_BASE_HEAT_CAPACITY
}
fn default_part_rating() -> f32 {
	1.0
}
fn default_injector_volume_rate() -> f32 {
	50.0
}

/// Loads machine definitions from JSON.
/// # Errors
/// If the JSON is malformed.
pub fn machine_prototypes_from_json(json: &str) -> Result<Vec<MachinePrototype>> {
	serde_json::from_str(json).wrap_err("malformed machine prototype data")
}

impl MachinePrototype {
	/// Instantiates a machine from this definition over the given pipe node
	/// and tile.
	/// # Errors
	/// If a tunable is out of range or a filter names an unregistered gas.
	pub fn build(&self, pipe: PipeId, tile: TileCoord) -> Result<Machine> {
		let kind = match self {
			Self::Vent {
				direction,
				external_bound,
				internal_bound,
				check_external,
				check_internal,
			} => {
				ensure!(
					external_bound.is_finite() && internal_bound.is_finite(),
					"vent with non-finite pressure bounds"
				);
				let mut pressure_checks = VentPressureBound::empty();
				if *check_external {
					pressure_checks |= VentPressureBound::EXTERNAL_BOUND;
				}
				if *check_internal {
					pressure_checks |= VentPressureBound::INTERNAL_BOUND;
				}
				MachineKind::Vent(VentPump {
					direction: *direction,
					external_bound: *external_bound,
					internal_bound: *internal_bound,
					pressure_checks,
				})
			}
			Self::Scrubber {
				direction,
				volume_rate,
				wide_net,
				filter_gases,
			} => {
				ensure!(
					volume_rate.is_finite() && *volume_rate >= 0.0,
					"scrubber with invalid volume rate {volume_rate}"
				);
				let filter_gases = filter_gases
					.iter()
					.map(|id| gas_idx_from_string(id))
					.collect::<Result<Vec<_>>>()?;
				MachineKind::Scrubber(Scrubber {
					direction: *direction,
					volume_rate: *volume_rate,
					wide_net: *wide_net,
					filter_gases,
				})
			}
			Self::PassiveVent => MachineKind::PassiveVent(PassiveVent),
			Self::ThermoMachine {
				mode,
				target_temperature,
				heat_capacity,
				part_rating,
			} => {
				ensure!(
					heat_capacity.is_finite() && *heat_capacity > 0.0,
					"thermomachine with invalid heat capacity {heat_capacity}"
				);
				ensure!(
					part_rating.is_finite() && *part_rating > 0.0,
					"thermomachine with invalid part rating {part_rating}"
				);
				ensure!(
					target_temperature.is_finite() && *target_temperature >= 0.0,
					"thermomachine with invalid target temperature {target_temperature}"
				);
				MachineKind::ThermoMachine(ThermoMachine {
					mode: *mode,
					target_temperature: *target_temperature,
					heat_capacity: *heat_capacity,
					part_rating: *part_rating,
				})
			}
			Self::OutletInjector { volume_rate } => {
				ensure!(
					volume_rate.is_finite() && *volume_rate >= 0.0,
					"injector with invalid volume rate {volume_rate}"
				);
				MachineKind::OutletInjector(OutletInjector {
					volume_rate: *volume_rate,
				})
			}
		};
		Ok(Machine::new(kind, pipe, tile))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::pipes::PipeNet;

	#[test]
	fn vent_defaults_fill_in() {
		register_standard_gases().unwrap();
		let protos = machine_prototypes_from_json(r#"[{"kind": "vent"}]"#).unwrap();
		assert_eq!(protos.len(), 1);
		let mut pipes = PipeNet::new();
		let pipe = pipes.add_node(100.0).unwrap();
		let machine = protos[0].build(pipe, (0, 0)).unwrap();
		match &machine.kind {
			MachineKind::Vent(vent) => {
				assert_eq!(vent.direction, VentPumpDirection::Releasing);
				assert_eq!(vent.external_bound, ONE_ATMOSPHERE);
				assert!(vent.pressure_checks.contains(VentPressureBound::EXTERNAL_BOUND));
				assert!(!vent.pressure_checks.contains(VentPressureBound::INTERNAL_BOUND));
			}
			_ => panic!("expected a vent"),
		}
	}

	#[test]
	fn scrubber_filters_resolve_to_indices() {
		register_standard_gases().unwrap();
		let protos = machine_prototypes_from_json(
			r#"[{"kind": "scrubber", "filter_gases": ["plasma", "co2"], "wide_net": true}]"#,
		)
		.unwrap();
		let mut pipes = PipeNet::new();
		let pipe = pipes.add_node(100.0).unwrap();
		let machine = protos[0].build(pipe, (2, 3)).unwrap();
		match &machine.kind {
			MachineKind::Scrubber(scrubber) => {
				assert_eq!(scrubber.filter_gases.len(), 2);
				assert!(scrubber.wide_net);
			}
			_ => panic!("expected a scrubber"),
		}
		assert_eq!(machine.tile(), (2, 3));
	}

	#[test]
	fn unknown_filter_gas_is_fatal() {
		register_standard_gases().unwrap();
		let protos = machine_prototypes_from_json(
			r#"[{"kind": "scrubber", "filter_gases": ["phlogiston"]}]"#,
		)
		.unwrap();
		let mut pipes = PipeNet::new();
		let pipe = pipes.add_node(100.0).unwrap();
		assert!(protos[0].build(pipe, (0, 0)).is_err());
	}

	#[test]
	fn malformed_json_is_fatal() {
		assert!(machine_prototypes_from_json("[{\"kind\": \"vent\"").is_err());
		assert!(gas_prototypes_from_json("{not json").is_err());
	}

	#[test]
	fn gas_prototypes_round_trip() {
		let json = serde_json::to_string(&standard_gas_definitions()).unwrap();
		let back = gas_prototypes_from_json(&json).unwrap();
		assert_eq!(back.len(), 5);
		assert_eq!(back[0].id, "o2");
	}
}
