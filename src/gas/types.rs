use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering::Relaxed};

use eyre::{bail, ensure, Result};
use fxhash::FxBuildHasher;
use parking_lot::{const_rwlock, RwLock};

use crate::prototypes::GasPrototype;

pub type GasIDX = usize;

/// An individual gas species, registered once at startup from prototype data.
#[derive(Clone)]
pub struct GasType {
	/// The index of this gas in the moles vector of a mixture. The most common
	/// representation in the crate, for speed.
	pub idx: GasIDX,
	/// The prototype ID, e.g. "o2". This is what gas strings refer to.
	pub id: Box<str>,
	/// Human-readable name.
	pub name: Box<str>,
	/// How much energy is needed to raise one mole of this gas one kelvin.
	pub specific_heat: f32,
}

static TOTAL_NUM_GASES: AtomicUsize = AtomicUsize::new(0);

static GAS_TYPES: RwLock<Vec<GasType>> = const_rwlock(Vec::new());

static SPECIFIC_HEATS: RwLock<Vec<f32>> = const_rwlock(Vec::new());

static GAS_IDS: RwLock<Option<HashMap<Box<str>, GasIDX, FxBuildHasher>>> = const_rwlock(None);

/// Registers a gas species from its prototype. Registration is idempotent for
/// identical definitions; conflicting redefinitions and invalid specific heats
/// are configuration errors.
/// # Errors
/// If the id is empty, the specific heat is non-finite or non-positive, or the
/// id was already registered with a different specific heat.
pub fn register_gas(proto: &GasPrototype) -> Result<GasIDX> {
	ensure!(!proto.id.is_empty(), "gas prototype with an empty id");
	ensure!(
		proto.specific_heat.is_finite() && proto.specific_heat > 0.0,
		"gas {:?} has invalid specific heat {}",
		proto.id,
		proto.specific_heat
	);
	let mut ids_lock = GAS_IDS.write();
	let ids = ids_lock.get_or_insert_with(Default::default);
	if let Some(&idx) = ids.get(proto.id.as_str()) {
		let known = GAS_TYPES.read()[idx].specific_heat;
		if (known - proto.specific_heat).abs() > f32::EPSILON {
			bail!(
				"gas {:?} re-registered with specific heat {} (was {})",
				proto.id,
				proto.specific_heat,
				known
			);
		}
		return Ok(idx);
	}
	let mut types = GAS_TYPES.write();
	let idx = types.len();
	types.push(GasType {
		idx,
		id: proto.id.clone().into_boxed_str(),
		name: proto.name.clone().into_boxed_str(),
		specific_heat: proto.specific_heat,
	});
	SPECIFIC_HEATS.write().push(proto.specific_heat);
	ids.insert(proto.id.clone().into_boxed_str(), idx);
	TOTAL_NUM_GASES.store(types.len(), Relaxed);
	tracing::info!(id = proto.id.as_str(), idx, "registered gas species");
	Ok(idx)
}

/// Amount of registered gas species.
pub fn total_num_gases() -> usize {
	TOTAL_NUM_GASES.load(Relaxed)
}

/// Runs the given closure with the specific heat table borrowed.
pub fn with_specific_heats<T>(f: impl FnOnce(&[f32]) -> T) -> T {
	f(SPECIFIC_HEATS.read().as_slice())
}

/// Runs the given closure with the full gas type table borrowed.
pub fn with_gas_types<T>(f: impl FnOnce(&[GasType]) -> T) -> T {
	f(GAS_TYPES.read().as_slice())
}

/// Looks a gas index up by its prototype id.
/// # Errors
/// If no such gas has been registered.
pub fn gas_idx_from_string(id: &str) -> Result<GasIDX> {
	GAS_IDS
		.read()
		.as_ref()
		.and_then(|ids| ids.get(id).copied())
		.ok_or_else(|| eyre::eyre!("no gas species with id {id:?}"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::prototypes::register_standard_gases;

	#[test]
	fn registration_is_idempotent() {
		register_standard_gases().unwrap();
		let first = gas_idx_from_string("o2").unwrap();
		register_standard_gases().unwrap();
		assert_eq!(first, gas_idx_from_string("o2").unwrap());
		assert!(total_num_gases() >= 5);
	}

	#[test]
	fn invalid_specific_heat_is_fatal() {
		let bad = GasPrototype {
			id: "unobtainium".to_string(),
			name: "Unobtainium".to_string(),
			specific_heat: -3.0,
		};
		assert!(register_gas(&bad).is_err());
		assert!(gas_idx_from_string("unobtainium").is_err());
	}

	#[test]
	fn conflicting_redefinition_is_fatal() {
		register_standard_gases().unwrap();
		let clash = GasPrototype {
			id: "o2".to_string(),
			name: "Oxygen".to_string(),
			specific_heat: 999.0,
		};
		assert!(register_gas(&clash).is_err());
	}
}
