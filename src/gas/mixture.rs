use std::cell::Cell;

use tinyvec::TinyVec;

use super::{constants::*, total_num_gases, with_specific_heats, GasIDX};

/// The gas mixture owned by one tile or one pipe network. Moles are stored
/// sparsely: the vector only reaches as far as the highest species this mix
/// has ever held, and `garbage_collect` trims zeroed tails back off.
///
/// The heat capacity cache lives in a `Cell`; a mixture is only ever mutated
/// by its single owner (tile arena or pipe network) during that owner's turn
/// in the tick, so there is no concurrent access to worry about.
#[derive(Clone)]
pub struct Mixture {
	temperature: f32,
	pub volume: f32,
	min_heat_capacity: f32,
	immutable: bool,
	moles: TinyVec<[f32; 8]>,
	cached_heat_capacity: Cell<Option<f32>>,
}

/*
	Cell is not thread-safe. However, we use it only for caching heat capacity. The worst case race condition
	is thus thread A and B try to access heat capacity at the same time; both find that it's currently
	uncached, so both go to calculate it; both calculate it, and both calculate it to the same value,
	then one sets the cache to that value, then the other does.

	Mutation never races with the cache: a mixture is only written through its single owner (tile arena,
	pipe network) during that owner's turn in the tick, and the shared ambient mixtures are never
	mutated after construction, only cloned out.
*/
unsafe impl Sync for Mixture {}

impl Default for Mixture {
	fn default() -> Self {
		Self::new()
	}
}

impl Mixture {
	/// Makes an empty gas mixture with the standard cell volume.
	pub fn new() -> Self {
		Self {
			moles: TinyVec::new(),
			temperature: TCMB,
			volume: CELL_VOLUME,
			min_heat_capacity: 0.0,
			immutable: false,
			cached_heat_capacity: Cell::new(None),
		}
	}
	/// Makes an empty gas mixture with the given volume.
	pub fn from_vol(vol: f32) -> Self {
		let mut ret = Self::new();
		ret.volume = vol;
		ret
	}
	/// Returns the temperature of the mix. Kelvin.
	pub fn get_temperature(&self) -> f32 {
		self.temperature
	}
	/// Sets the temperature, if the mix isn't immutable. Negative and
	/// non-finite values are rejected rather than propagated.
	pub fn set_temperature(&mut self, temp: f32) {
		if !self.immutable && temp.is_finite() {
			self.temperature = temp.max(0.0);
		}
	}
	/// Sets the minimum heat capacity of this mix.
	pub fn set_min_heat_capacity(&mut self, amt: f32) {
		self.min_heat_capacity = amt;
		self.cached_heat_capacity.set(None);
	}
	/// Returns an iterator over the gas indices and mole amounts thereof.
	pub fn enumerate(&self) -> impl Iterator<Item = (GasIDX, f32)> + '_ {
		self.moles.iter().copied().enumerate()
	}
	/// Returns (by value) the amount of moles of a given index the mix has.
	pub fn get_moles(&self, idx: GasIDX) -> f32 {
		self.moles.get(idx).copied().unwrap_or(0.0)
	}
	/// Marks the mix as immutable: all mutation becomes a no-op. Space and
	/// other boundary mixtures use this so that gas merged into them is
	/// discarded and gas removed from them comes from nothing.
	pub fn mark_immutable(&mut self) {
		self.immutable = true;
	}
	/// Returns whether this gas mixture is immutable.
	pub fn is_immutable(&self) -> bool {
		self.immutable
	}
	fn maybe_expand(&mut self, size: usize) {
		if self.moles.len() < size {
			self.moles.resize(size, 0.0);
		}
	}
	/// If the mix is not immutable, sets the gas at the given `idx` to the
	/// given `amt`. Negative amounts are clamped to zero.
	pub fn set_moles(&mut self, idx: GasIDX, amt: f32) {
		if !self.immutable && idx < total_num_gases() && amt.is_finite() {
			self.maybe_expand(idx + 1);
			self.moles[idx] = amt.max(0.0);
			self.cached_heat_capacity.set(None);
		}
	}
	/// Adds (or, negative, removes) moles of one gas, clamping at zero.
	pub fn adjust_moles(&mut self, idx: GasIDX, amt: f32) {
		if !self.immutable && amt.is_finite() && idx < total_num_gases() {
			self.maybe_expand(idx + 1);
			let r = &mut self.moles[idx];
			*r = (*r + amt).max(0.0);
			if amt < 0.0 {
				self.garbage_collect();
			}
			self.cached_heat_capacity.set(None);
		}
	}
	#[inline(never)] // mostly this makes it so that heat_capacity itself is inlined
	fn slow_heat_capacity(&self) -> f32 {
		let heat_cap = with_specific_heats(|heats| {
			self.moles
				.iter()
				.copied()
				.zip(heats.iter())
				.fold(0.0, |acc, (amt, cap)| cap.mul_add(amt, acc))
		})
		.max(self.min_heat_capacity);
		self.cached_heat_capacity.set(Some(heat_cap));
		heat_cap
	}
	/// The heat capacity of the material. Joules per kelvin.
	pub fn heat_capacity(&self) -> f32 {
		self.cached_heat_capacity
			.get()
			.filter(|cap| cap.is_finite() && cap.is_sign_positive())
			.unwrap_or_else(|| self.slow_heat_capacity())
	}
	/// The total mole count of the mixture.
	pub fn total_moles(&self) -> f32 {
		self.moles.iter().sum()
	}
	/// Pressure. Kilopascals.
	pub fn pressure(&self) -> f32 {
		if self.volume <= 0.0 {
			return 0.0;
		}
		self.total_moles() * R_IDEAL_GAS_EQUATION * self.temperature / self.volume
	}
	/// Thermal energy. Joules.
	pub fn thermal_energy(&self) -> f32 {
		self.heat_capacity() * self.temperature
	}
	/// Merges the given mixture into this one, consuming it. The new
	/// temperature is the heat-capacity-weighted average of the two.
	pub fn merge(&mut self, giver: Self) {
		if self.immutable {
			return;
		}
		let our_heat_capacity = self.heat_capacity();
		let other_heat_capacity = giver.heat_capacity();
		self.maybe_expand(giver.moles.len());
		for (a, b) in self.moles.iter_mut().zip(giver.moles.iter()) {
			*a += b;
		}
		let combined_heat_capacity = our_heat_capacity + other_heat_capacity;
		if combined_heat_capacity > MINIMUM_HEAT_CAPACITY {
			self.set_temperature(
				(our_heat_capacity * self.temperature + other_heat_capacity * giver.temperature)
					/ combined_heat_capacity,
			);
		}
		self.cached_heat_capacity.set(Some(combined_heat_capacity));
	}
	/// Takes a ratio of this mixture's moles, proportionally across every
	/// species, and returns them as a new mixture at the same temperature
	/// and volume. The ratio is clamped to `[0, 1]`; an immutable source is
	/// sampled without shrinking.
	pub fn remove_ratio(&mut self, ratio: f32) -> Self {
		let mut removed = Self::from_vol(self.volume);
		removed.temperature = self.temperature;
		if !ratio.is_finite() || ratio <= 0.0 || self.total_moles() <= 0.0 {
			return removed;
		}
		let ratio = ratio.min(1.0);
		removed.maybe_expand(self.moles.len());
		for (ours, theirs) in self.moles.iter_mut().zip(removed.moles.iter_mut()) {
			let delta = *ours * ratio;
			*theirs = delta;
			if !self.immutable {
				*ours -= delta;
			}
		}
		if !self.immutable {
			self.cached_heat_capacity.set(None);
			self.garbage_collect();
		}
		removed.garbage_collect();
		removed
	}
	/// Like `remove_ratio`, but with an absolute number of moles. Amounts at
	/// or above the total empty the mixture; nothing ever goes negative.
	pub fn remove(&mut self, amount: f32) -> Self {
		let total = self.total_moles();
		if total <= 0.0 {
			let mut removed = Self::from_vol(self.volume);
			removed.temperature = self.temperature;
			return removed;
		}
		self.remove_ratio(amount / total)
	}
	/// Moves only the moles of the given species from this mixture into
	/// `into`, leaving the other species untouched. The receiving side's
	/// temperature shifts by the usual heat-capacity weighting.
	pub fn scrub_into(&mut self, into: &mut Self, gases: &[GasIDX]) {
		if self.immutable {
			return;
		}
		let mut buffer = Self::from_vol(self.volume);
		buffer.temperature = self.temperature;
		for &idx in gases {
			let moles = self.get_moles(idx);
			if moles > 0.0 {
				buffer.set_moles(idx, moles);
				self.moles[idx] = 0.0;
			}
		}
		self.cached_heat_capacity.set(None);
		self.garbage_collect();
		into.merge(buffer);
	}
	/// Clears the moles from the gas.
	pub fn clear(&mut self) {
		if !self.immutable {
			self.moles.clear();
			self.cached_heat_capacity.set(None);
		}
	}
	/// Multiplies every gas molage with this value.
	pub fn multiply(&mut self, multiplier: f32) {
		if !self.immutable && multiplier.is_finite() && multiplier >= 0.0 {
			for amt in self.moles.iter_mut() {
				*amt *= multiplier;
			}
			self.cached_heat_capacity.set(None);
			self.garbage_collect();
		}
	}
	// Removes all redundant zeroes from the gas mixture.
	pub fn garbage_collect(&mut self) {
		let mut last_valid_found = 0;
		for (i, amt) in self.moles.iter_mut().enumerate() {
			if *amt > GAS_MIN_MOLES {
				last_valid_found = i + 1;
			} else {
				*amt = 0.0;
			}
		}
		self.moles.truncate(last_valid_found);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::prototypes::register_standard_gases;

	#[test]
	fn test_merge() {
		register_standard_gases().unwrap();
		let mut into = Mixture::new();
		into.set_moles(0, 82.0);
		into.set_moles(1, 22.0);
		into.set_temperature(293.15);
		let mut source = Mixture::new();
		source.set_moles(3, 100.0);
		source.set_temperature(313.15);
		into.merge(source);
		assert_eq!(into.get_moles(3), 100.0);
		assert_eq!(into.get_moles(0), 82.0);
		/*
			make sure that the merge successfully changed the temperature of the mix merged into:
			test gases have heat capacities of 2,080 and 20,000 respectively, so total thermal energies of
			609,752 and 6,263,000 respectively once multiplied by temperatures. add those together,
			then divide by new total heat capacity:
			(609,752 + 6,263,000)/(2,080 + 20,000) =
			6,872,752 / 22,080 ~
			311.265942
			so we compare to see if it's relatively close to 311.266, cause of floating point precision
		*/
		assert!(
			(into.get_temperature() - 311.266).abs() < 0.01,
			"{} should be near 311.266, is {}",
			into.get_temperature(),
			(into.get_temperature() - 311.266)
		);
	}

	#[test]
	fn test_remove() {
		register_standard_gases().unwrap();
		let mut removed = Mixture::new();
		removed.set_moles(0, 22.0);
		removed.set_moles(1, 82.0);
		let new = removed.remove_ratio(0.5);
		assert_eq!(removed.get_moles(0), 11.0);
		assert_eq!(removed.get_moles(1), 41.0);
		assert_eq!(new.get_moles(0), 11.0);
		assert_eq!(new.get_moles(1), 41.0);
		removed.mark_immutable();
		let new_two = removed.remove_ratio(0.5);
		// immutable source samples without shrinking
		assert_eq!(removed.get_moles(0), 11.0);
		assert_eq!(removed.get_moles(1), 41.0);
		assert_eq!(new_two.get_moles(0), 5.5);
	}

	#[test]
	fn remove_clamps_to_available() {
		register_standard_gases().unwrap();
		let mut mix = Mixture::new();
		mix.set_moles(0, 4.0);
		mix.set_temperature(293.15);
		let all = mix.remove(100.0);
		assert_eq!(all.get_moles(0), 4.0);
		assert_eq!(mix.total_moles(), 0.0);
		// and removing from an empty mixture yields an empty mixture
		let nothing = mix.remove(5.0);
		assert_eq!(nothing.total_moles(), 0.0);
	}

	#[test]
	fn merge_remove_conserves_moles() {
		register_standard_gases().unwrap();
		let mut a = Mixture::new();
		a.set_moles(0, 150.0);
		a.set_moles(3, 25.0);
		a.set_temperature(293.15);
		let mut b = Mixture::new();
		b.set_moles(1, 300.0);
		b.set_temperature(370.0);
		let before = a.total_moles() + b.total_moles();
		for _ in 0..12 {
			let chunk = a.remove(17.0);
			b.merge(chunk);
			let back = b.remove_ratio(0.3);
			a.merge(back);
		}
		let after = a.total_moles() + b.total_moles();
		assert!((before - after).abs() < 1e-3, "{before} != {after}");
		for mix in [&a, &b] {
			for (_, amt) in mix.enumerate() {
				assert!(amt >= 0.0);
			}
		}
	}

	#[test]
	fn scrub_into_moves_only_filtered_species() {
		register_standard_gases().unwrap();
		let mut tile = Mixture::new();
		tile.set_moles(0, 10.0);
		tile.set_moles(3, 10.0);
		tile.set_temperature(293.15);
		let mut pipe = Mixture::from_vol(70.0);
		tile.scrub_into(&mut pipe, &[3]);
		assert_eq!(tile.get_moles(0), 10.0);
		assert_eq!(tile.get_moles(3), 0.0);
		assert_eq!(pipe.get_moles(3), 10.0);
		assert_eq!(pipe.get_moles(0), 0.0);
		assert!((pipe.get_temperature() - 293.15).abs() < 0.01);
	}
}
