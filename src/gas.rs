#[allow(dead_code)]
pub mod constants;

pub mod mixture;

pub mod types;

pub use mixture::Mixture;
pub use types::{
	gas_idx_from_string, register_gas, total_num_gases, with_gas_types, with_specific_heats,
	GasIDX, GasType,
};

use dashmap::DashMap;
use eyre::{ensure, Result};
use fxhash::FxBuildHasher;

use crate::parser::parse_gas_string;
use constants::T20C;

lazy_static::lazy_static! {
	// Parsed ambient definitions, keyed by hash of their gas string: one
	// canonical mixture per distinct definition, cloned out on demand.
	static ref AMBIENT_MIXES: DashMap<u32, Mixture, FxBuildHasher> = Default::default();
}

/// Builds a mixture from a gas string like `"o2=21.8;n2=82.1;TEMP=293.15"`
/// with the given volume. Definitions are parsed once and cached; the `TEMP`
/// key sets the temperature, defaulting to 20degC.
/// # Errors
/// If the string doesn't parse, names an unregistered gas, or carries a
/// negative or non-finite quantity.
pub fn ambient_mixture(def: &str, volume: f32) -> Result<Mixture> {
	ensure!(
		volume.is_finite() && volume > 0.0,
		"ambient mixture with invalid volume {volume}"
	);
	let key = fxhash::hash32(def);
	if let Some(cached) = AMBIENT_MIXES.get(&key) {
		let mut mix = cached.clone();
		mix.volume = volume;
		return Ok(mix);
	}
	let (leftover, fields) =
		parse_gas_string(def).map_err(|e| eyre::eyre!("failed to parse gas string {def:?}: {e}"))?;
	ensure!(
		leftover.is_empty(),
		"trailing garbage in gas string {def:?}: {leftover:?}"
	);
	let mut mix = Mixture::new();
	mix.set_temperature(T20C);
	for (id, amount) in fields {
		ensure!(
			amount.is_finite() && amount >= 0.0,
			"invalid quantity {amount} for {id:?} in gas string {def:?}"
		);
		if id == "TEMP" {
			mix.set_temperature(amount);
		} else {
			mix.set_moles(gas_idx_from_string(id)?, amount);
		}
	}
	AMBIENT_MIXES.insert(key, mix.clone());
	mix.volume = volume;
	Ok(mix)
}

#[cfg(test)]
mod tests {
	use super::constants::*;
	use super::*;
	use crate::prototypes::register_standard_gases;

	#[test]
	fn ambient_mixture_parses_and_caches() {
		register_standard_gases().unwrap();
		let def = "o2=21.8;n2=82.1;TEMP=293.15";
		let mix = ambient_mixture(def, CELL_VOLUME).unwrap();
		assert_eq!(mix.get_moles(gas_idx_from_string("o2").unwrap()), 21.8);
		assert_eq!(mix.get_moles(gas_idx_from_string("n2").unwrap()), 82.1);
		assert!((mix.get_temperature() - 293.15).abs() < 0.001);
		// second hit comes from the cache with a different volume
		let again = ambient_mixture(def, 70.0).unwrap();
		assert_eq!(again.volume, 70.0);
		assert_eq!(again.get_moles(0), mix.get_moles(0));
	}

	#[test]
	fn ambient_mixture_rejects_unknown_species() {
		register_standard_gases().unwrap();
		assert!(ambient_mixture("phlogiston=10", CELL_VOLUME).is_err());
	}

	#[test]
	fn ambient_mixture_defaults_to_room_temperature() {
		register_standard_gases().unwrap();
		let mix = ambient_mixture("o2=10", CELL_VOLUME).unwrap();
		assert!((mix.get_temperature() - T20C).abs() < 0.001);
	}
}
