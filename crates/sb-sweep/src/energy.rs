//! Fine-group energy structure used for flux spectrum tallies.

/// Lower edge of the tallied range, eV.
pub const ENERGY_MIN_EV: f64 = 1.0e-5;
/// Upper edge of the tallied range, eV.
pub const ENERGY_MAX_EV: f64 = 2.0e7;

/// `groups + 1` logarithmically spaced group boundaries from
/// [`ENERGY_MIN_EV`] to [`ENERGY_MAX_EV`], ascending.
pub fn fine_group_structure(groups: usize) -> Vec<f64> {
    if groups == 0 {
        return Vec::new();
    }
    let lo = ENERGY_MIN_EV.log10();
    let hi = ENERGY_MAX_EV.log10();
    let width = (hi - lo) / groups as f64;

    let mut divs: Vec<f64> = (0..=groups)
        .map(|i| 10f64.powf(lo + width * i as f64))
        .collect();
    divs[0] = ENERGY_MIN_EV;
    divs[groups] = ENERGY_MAX_EV;
    divs
}
