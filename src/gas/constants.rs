pub const R_IDEAL_GAS_EQUATION: f32 = 8.31; //kPa*L/(K*mol)
pub const ONE_ATMOSPHERE: f32 = 101.325; //kPa
pub const TCMB: f32 = 2.7; // -270.3degC
pub const T0C: f32 = 273.15; // 0degC
pub const T20C: f32 = 293.15; // 20degC

pub const GAS_MIN_MOLES: f32 = 0.00000005;

pub const MINIMUM_HEAT_CAPACITY: f32 = 0.0003;

pub const CELL_VOLUME: f32 = 2500.0; //liters in a cell
pub const MOLES_CELLSTANDARD: f32 = ONE_ATMOSPHERE * CELL_VOLUME / (T20C * R_IDEAL_GAS_EQUATION); //moles in a 2.5 m^3 cell at 101.325 kPa and 20 degC
pub const O2STANDARD: f32 = 0.21; //percentage of oxygen in a normal mixture of air
pub const N2STANDARD: f32 = 0.79; //same but for nitrogen
pub const MOLES_O2STANDARD: f32 = MOLES_CELLSTANDARD * O2STANDARD; // O2 standard value (21%)
pub const MOLES_N2STANDARD: f32 = MOLES_CELLSTANDARD * N2STANDARD; // N2 standard value (79%)

//TILE DIFFUSION
pub const MINIMUM_AIR_RATIO_TO_MOVE: f32 = 0.001; //Minimum ratio of air that must move to/from a tile
pub const MINIMUM_MOLES_DELTA_TO_MOVE: f32 = MOLES_CELLSTANDARD * MINIMUM_AIR_RATIO_TO_MOVE;
pub const MINIMUM_PRESSURE_DELTA_TO_MOVE: f32 = 0.5; //kPa; below this two tiles count as settled
pub const MINIMUM_TEMPERATURE_DELTA_TO_CONSIDER: f32 = 0.5; //Minimum temperature difference before the gas temperatures are just set to be equal

//DEVICES
pub const MAX_VENT_PRESSURE_DELTA: f32 = 10000.0; //per-tick ceiling on the pressure delta a vent resolves
pub const MAX_SCRUBBER_PRESSURE: f32 = 50.0 * ONE_ATMOSPHERE; //scrubbers refuse to push into a pipe above this
pub const MINIMUM_PASSIVE_VENT_PRESSURE_DELTA: f32 = 0.5; //kPa

//THERMOMACHINES
pub const THERMOMACHINE_BASE_HEAT_CAPACITY: f32 = 5000.0;
pub const THERMOMACHINE_FREEZER_TEMPERATURE_SPAN: f32 = 40.0; //kelvin of reach below 0degC per part rating
pub const THERMOMACHINE_HEATER_TEMPERATURE_SPAN: f32 = 60.0; //kelvin of reach above 20degC per part rating
