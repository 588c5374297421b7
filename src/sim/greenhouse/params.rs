use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::record::named_record;
use crate::error::ConfigurationError;

named_record! {
    /// Universal constants and solar radiation partitioning.
    #[serde(default)]
    pub struct PhysicalConstants {
        /// Gravitational acceleration in m/s^2.
        gravity,
        /// Molar gas constant in J/(kmol*K).
        gas_constant,
        /// Stefan-Boltzmann constant in W/(m^2*K^4).
        stefan_boltzmann,
        /// Molar mass of air in kg/kmol.
        molar_mass_air,
        /// Molar mass of water in kg/kmol.
        molar_mass_water,
        /// Molar mass of CO2 in kg/mol.
        molar_mass_co2,
        /// Molar mass of CH2O in kg/mol.
        molar_mass_ch2o,
        /// Latent heat of evaporation in J/kg.
        latent_heat,
        /// Psychrometric constant in Pa/K.
        psychrometric_constant,
        /// Specific heat of air in J/(kg*K).
        air_specific_heat,
        /// Air density at sea level in kg/m^3.
        air_density_sea_level,
        /// FIR emission coefficient of the sky.
        sky_emissivity,
        /// PAR share of global radiation.
        global_par_fraction,
        /// NIR share of global radiation.
        global_nir_fraction,
        /// Share of global radiation absorbed by greenhouse construction elements.
        global_to_air_fraction,
        /// Conversion from mg/m^3 CO2 to ppm.
        co2_mg_to_ppm,
    }
}

impl PhysicalConstants {
    pub fn new() -> Self {
        Self {
            gravity: 9.81,
            gas_constant: 8314.0,
            stefan_boltzmann: 5.67e-8,
            molar_mass_air: 28.96,
            molar_mass_water: 18.0,
            molar_mass_co2: 44e-3,
            molar_mass_ch2o: 30e-3,
            latent_heat: 2.45e6,
            psychrometric_constant: 65.8,
            air_specific_heat: 1e3,
            air_density_sea_level: 1.2,
            sky_emissivity: 1.0,
            global_par_fraction: 0.5,
            global_nir_fraction: 0.5,
            global_to_air_fraction: 0.1,
            co2_mg_to_ppm: 0.554,
        }
    }
}

impl Default for PhysicalConstants {
    fn default() -> Self {
        Self::new()
    }
}

named_record! {
    /// Greenhouse structure, ventilation openings and cover convection.
    #[serde(default)]
    pub struct Construction {
        /// Floor area in m^2.
        floor_area,
        /// Surface area of the cover including side walls in m^2.
        cover_area,
        /// Height of the main compartment (below the thermal screen) in m.
        air_height,
        /// Mean height of the greenhouse in m.
        greenhouse_height,
        /// Maximum roof ventilation area in m^2.
        roof_vent_area,
        /// Vertical dimension of a single ventilation opening in m.
        vent_height,
        /// Mean roof slope in degrees.
        roof_slope_deg,
        /// Altitude of the site in m.
        elevation,
        /// Ventilation discharge coefficient.
        discharge_coefficient,
        /// Ventilation global wind pressure coefficient.
        wind_pressure_coefficient,
        /// Leakage coefficient.
        leakage_coefficient,
        /// Share of leakage attributed to the roof.
        leakage_top_fraction,
        /// Wind speed used for leakage below this value in m/s.
        min_leakage_wind,
        /// Ventilation reduction by an insect screen (1 = no screen).
        insect_screen_factor,
        /// Convective heat exchange coefficient of the cover inside, W/(m^2*K^(4/3)).
        cover_inside_hec,
        /// Outside cover convection, constant part in W/(m^2*K).
        cover_outside_hec_1,
        /// Outside cover convection, wind factor in J/(m^3*K).
        cover_outside_hec_2,
        /// Outside cover convection, wind exponent.
        cover_outside_hec_3,
    }
}

impl Construction {
    /// Dutch Venlo-type greenhouse of 1.4 ha.
    pub fn new() -> Self {
        Self {
            floor_area: 1.4e4,
            cover_area: 1.8e4,
            air_height: 3.8,
            greenhouse_height: 4.2,
            roof_vent_area: 1.4e3,
            vent_height: 0.68,
            roof_slope_deg: 25.0,
            elevation: 0.0,
            discharge_coefficient: 0.75,
            wind_pressure_coefficient: 0.09,
            leakage_coefficient: 1e-4,
            leakage_top_fraction: 0.5,
            min_leakage_wind: 0.25,
            insect_screen_factor: 1.0,
            cover_inside_hec: 1.86,
            cover_outside_hec_1: 2.8,
            cover_outside_hec_2: 1.2,
            cover_outside_hec_3: 1.0,
        }
    }
}

impl Default for Construction {
    fn default() -> Self {
        Self::new()
    }
}

named_record! {
    /// Optical and thermal properties of the roof material.
    #[serde(default)]
    pub struct CoverProperties {
        /// PAR transmission.
        par_transmission,
        /// NIR transmission.
        nir_transmission,
        /// FIR transmission.
        fir_transmission,
        /// PAR reflection.
        par_reflection,
        /// NIR reflection.
        nir_reflection,
        /// FIR reflection.
        fir_reflection,
        /// Density in kg/m^3.
        density,
        /// Specific heat in J/(kg*K).
        specific_heat,
        /// Thickness in m.
        thickness,
        /// Thermal conductivity in W/(m*K).
        conductivity,
    }
}

impl CoverProperties {
    /// Horticultural glass.
    pub fn new() -> Self {
        Self {
            par_transmission: 0.85,
            nir_transmission: 0.85,
            fir_transmission: 0.0,
            par_reflection: 0.13,
            nir_reflection: 0.13,
            fir_reflection: 0.15,
            density: 2.6e3,
            specific_heat: 0.84e3,
            thickness: 4e-3,
            conductivity: 1.05,
        }
    }
}

impl Default for CoverProperties {
    fn default() -> Self {
        Self::new()
    }
}

named_record! {
    /// Movable thermal (energy) screen.
    #[serde(default)]
    pub struct ThermalScreen {
        /// PAR transmission.
        par_transmission,
        /// NIR transmission.
        nir_transmission,
        /// FIR transmission.
        fir_transmission,
        /// PAR reflection.
        par_reflection,
        /// NIR reflection.
        nir_reflection,
        /// FIR emission coefficient.
        fir_emissivity,
        /// Density in kg/m^3.
        density,
        /// Specific heat in J/(kg*K).
        specific_heat,
        /// Thickness in m.
        thickness,
        /// Air permeability in m^3/(m^2*K^0.66*s).
        permeability,
    }
}

impl ThermalScreen {
    pub fn new() -> Self {
        Self {
            par_transmission: 0.6,
            nir_transmission: 0.6,
            fir_transmission: 0.15,
            par_reflection: 0.35,
            nir_reflection: 0.35,
            fir_emissivity: 0.67,
            density: 0.2e3,
            specific_heat: 1.8e3,
            thickness: 0.35e-3,
            permeability: 0.05e-3,
        }
    }
}

impl Default for ThermalScreen {
    fn default() -> Self {
        Self::new()
    }
}

named_record! {
    /// Concrete floor and the soil layers beneath it.
    #[serde(default)]
    pub struct FloorAndSoil {
        /// FIR emission coefficient of the floor.
        emissivity,
        /// Floor density in kg/m^3.
        density,
        /// Floor specific heat in J/(kg*K).
        specific_heat,
        /// Floor thickness in m.
        thickness,
        /// Floor thermal conductivity in W/(m*K).
        conductivity,
        /// PAR reflection of the floor.
        par_reflection,
        /// NIR reflection of the floor.
        nir_reflection,
        /// Volumetric heat capacity of the soil in J/(m^3*K).
        soil_heat_capacity,
        /// Thermal conductivity of the soil in W/(m*K).
        soil_conductivity,
        /// Thickness of soil layer 1 in m.
        soil_layer_1,
        /// Thickness of soil layer 2 in m.
        soil_layer_2,
        /// Thickness of soil layer 3 in m.
        soil_layer_3,
        /// Thickness of soil layer 4 in m.
        soil_layer_4,
        /// Thickness of soil layer 5 in m.
        soil_layer_5,
        /// Thickness of the external soil layer (boundary) in m.
        external_soil_thickness,
    }
}

impl FloorAndSoil {
    pub fn new() -> Self {
        Self {
            emissivity: 1.0,
            density: 2300.0,
            specific_heat: 0.88e3,
            thickness: 0.02,
            conductivity: 1.7,
            par_reflection: 0.65,
            nir_reflection: 0.5,
            soil_heat_capacity: 1.73e6,
            soil_conductivity: 0.85,
            soil_layer_1: 0.04,
            soil_layer_2: 0.08,
            soil_layer_3: 0.16,
            soil_layer_4: 0.32,
            soil_layer_5: 0.64,
            external_soil_thickness: 1.28,
        }
    }

    /// Soil layer thicknesses from top to bottom in m.
    pub fn soil_layers(&self) -> [f64; 5] {
        [
            self.soil_layer_1,
            self.soil_layer_2,
            self.soil_layer_3,
            self.soil_layer_4,
            self.soil_layer_5,
        ]
    }
}

impl Default for FloorAndSoil {
    fn default() -> Self {
        Self::new()
    }
}

named_record! {
    /// Pipe-rail heating and CO2 supply.
    #[serde(default)]
    pub struct HeatingSystem {
        /// FIR emission coefficient of the pipes.
        pipe_emissivity,
        /// External pipe diameter in m.
        pipe_outer_diameter,
        /// Internal pipe diameter in m.
        pipe_inner_diameter,
        /// Pipe length per floor area in m/m^2.
        pipe_length,
        /// Density of steel in kg/m^3.
        steel_density,
        /// Specific heat of steel in J/(kg*K).
        steel_specific_heat,
        /// Density of water in kg/m^3.
        water_density,
        /// Specific heat of water in J/(kg*K).
        water_specific_heat,
        /// Boiler capacity per floor area in W/m^2.
        boiler_capacity,
        /// CO2 injection capacity per floor area in mg/(m^2*s).
        co2_injection_capacity,
    }
}

impl HeatingSystem {
    pub fn new() -> Self {
        Self {
            pipe_emissivity: 0.88,
            pipe_outer_diameter: 51e-3,
            pipe_inner_diameter: 47e-3,
            pipe_length: 1.875,
            steel_density: 7850.0,
            steel_specific_heat: 0.64e3,
            water_density: 1e3,
            water_specific_heat: 4.18e3,
            boiler_capacity: 130.0,
            co2_injection_capacity: 7.2e4 / 1.4e4,
        }
    }
}

impl Default for HeatingSystem {
    fn default() -> Self {
        Self::new()
    }
}

named_record! {
    /// Top lights. The defaults describe an installation without lamps.
    #[serde(default)]
    pub struct LampProperties {
        /// Maximum electrical input in W/m^2.
        max_intensity,
        /// Heating setpoint correction while lamps are on, in °C.
        heat_correction,
        /// Fraction of electrical input converted to PAR.
        par_efficiency,
        /// Fraction of electrical input converted to NIR.
        nir_efficiency,
        /// PAR transmission of the lamp layer.
        par_transmission,
        /// PAR reflection of the lamp layer.
        par_reflection,
        /// NIR transmission of the lamp layer.
        nir_transmission,
        /// NIR reflection of the lamp layer.
        nir_reflection,
        /// FIR transmission of the lamp layer.
        fir_transmission,
        /// Lamp area per floor area.
        area_fraction,
        /// FIR emissivity of the lamp top.
        emissivity_top,
        /// FIR emissivity of the lamp bottom.
        emissivity_bottom,
        /// Heat capacity in J/(K*m^2).
        heat_capacity,
        /// Lamp-air heat exchange coefficient in W/(m^2*K).
        air_hec,
        /// Fraction of electrical input removed by active cooling.
        cooling_fraction,
        /// Photons per joule of lamp PAR in umol/J.
        par_photon_ratio,
    }
}

impl LampProperties {
    pub fn new() -> Self {
        Self {
            max_intensity: 0.0,
            heat_correction: 0.0,
            par_efficiency: 0.0,
            nir_efficiency: 0.0,
            par_transmission: 1.0,
            par_reflection: 0.0,
            nir_transmission: 1.0,
            nir_reflection: 0.0,
            fir_transmission: 1.0,
            area_fraction: 0.0,
            emissivity_top: 0.0,
            emissivity_bottom: 0.0,
            heat_capacity: 350.0,
            air_hec: 0.0,
            cooling_fraction: 0.0,
            par_photon_ratio: 0.0,
        }
    }

    /// Lamp properties of a given lamp technology.
    pub fn of_type(lamp_type: LampType) -> Self {
        match lamp_type {
            LampType::None => Self::new(),
            LampType::Hps => Self {
                max_intensity: 200.0 / 1.8,
                par_efficiency: 1.8 / 4.9,
                nir_efficiency: 0.22,
                par_transmission: 0.98,
                nir_transmission: 0.98,
                fir_transmission: 0.98,
                area_fraction: 0.02,
                emissivity_top: 0.1,
                emissivity_bottom: 0.9,
                heat_capacity: 100.0,
                air_hec: 0.09,
                par_photon_ratio: 4.9,
                ..Self::new()
            },
            LampType::Led => Self {
                max_intensity: 200.0 / 3.0,
                par_efficiency: 3.0 / 5.41,
                nir_efficiency: 0.02,
                par_transmission: 0.98,
                nir_transmission: 0.98,
                fir_transmission: 0.98,
                area_fraction: 0.02,
                emissivity_top: 0.88,
                emissivity_bottom: 0.88,
                heat_capacity: 10.0,
                air_hec: 2.3,
                par_photon_ratio: 5.41,
                ..Self::new()
            },
        }
    }
}

impl Default for LampProperties {
    fn default() -> Self {
        Self::new()
    }
}

/// Lamp technology presets, all delivering 200 umol/(m^2*s) of PAR at full power.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LampType {
    #[default]
    None,
    /// High-pressure sodium.
    Hps,
    /// Light-emitting diodes.
    Led,
}

named_record! {
    /// Canopy physics, photosynthesis and tomato growth.
    #[serde(default)]
    pub struct CropParameters {
        /// Convective heat exchange coefficient leaf-air in W/(m^2*K).
        leaf_air_hec,
        /// FIR emission coefficient of the canopy.
        emissivity,
        /// PAR reflection of the canopy.
        par_reflection,
        /// NIR reflection of the canopy.
        nir_reflection,
        /// PAR extinction coefficient of direct light.
        k1_par,
        /// PAR extinction coefficient of light reflected from the floor.
        k2_par,
        /// NIR extinction coefficient.
        k_nir,
        /// FIR extinction coefficient.
        k_fir,
        /// Heat capacity of leaves in J/(K*m^2 leaf).
        leaf_heat_capacity,
        /// Transpiration radiation factor, first coefficient in W/m^2.
        c_evap_1,
        /// Transpiration radiation factor, second coefficient in W/m^2.
        c_evap_2,
        /// CO2 factor of stomatal resistance by day in ppm^-2.
        c_evap_3_day,
        /// CO2 factor of stomatal resistance by night in ppm^-2.
        c_evap_3_night,
        /// Vapor pressure factor of stomatal resistance by day in Pa^-2.
        c_evap_4_day,
        /// Vapor pressure factor of stomatal resistance by night in Pa^-2.
        c_evap_4_night,
        /// Radiation above the canopy defining day and night for stomata in W/m^2.
        stomata_radiation_setpoint,
        /// Slope of the stomatal day/night switch in m^2/W.
        stomata_switch_slope,
        /// Boundary layer resistance of the canopy in s/m.
        boundary_resistance,
        /// Minimum stomatal resistance in s/m.
        min_stomatal_resistance,
        /// Maximum electron transport rate at 25 °C in umol/(m^2 leaf*s).
        j25_leaf_max,
        /// CO2 compensation point temperature effect in umol/(mol*K).
        c_gamma,
        /// Stomatal CO2 concentration relative to air.
        stomata_co2_ratio,
        /// Activation energy of electron transport in J/mol.
        activation_energy,
        /// Reference temperature in K.
        reference_temperature,
        /// Entropy term of electron transport in J/(mol*K).
        entropy_term,
        /// Deactivation energy of electron transport in J/mol.
        deactivation_energy,
        /// Curvature of the light response.
        curvature,
        /// Conversion of photons to electrons.
        light_use_efficiency,
        /// Photons per joule of solar PAR in umol/J.
        sun_par_photon_ratio,
        /// Maximum leaf area index in m^2/m^2.
        lai_max,
        /// Specific leaf area in m^2 leaf/mg CH2O.
        specific_leaf_area,
        /// Regression coefficient of maintenance respiration in s^-1.
        relative_growth_rate,
        /// Regression coefficient of maintenance respiration in s.
        rgr_coefficient,
        /// Fruit harvest threshold in mg CH2O/m^2.
        fruit_max,
        /// Growth respiration coefficient of fruit.
        fruit_growth_cost,
        /// Growth respiration coefficient of leaves.
        leaf_growth_cost,
        /// Growth respiration coefficient of stems.
        stem_growth_cost,
        /// Q10 of maintenance respiration.
        q10_maintenance,
        /// Maintenance respiration coefficient of fruit in mg CH2O/(mg CH2O*s).
        fruit_maintenance,
        /// Maintenance respiration coefficient of leaves in mg CH2O/(mg CH2O*s).
        leaf_maintenance,
        /// Maintenance respiration coefficient of stems in mg CH2O/(mg CH2O*s).
        stem_maintenance,
        /// Potential fruit growth rate at 20 °C in mg CH2O/(m^2*s).
        fruit_growth_rate,
        /// Potential leaf growth rate at 20 °C in mg CH2O/(m^2*s).
        leaf_growth_rate,
        /// Potential stem growth rate at 20 °C in mg CH2O/(m^2*s).
        stem_growth_rate,
        /// Buffer level above which photosynthesis is inhibited in mg CH2O/m^2.
        buffer_max,
        /// Buffer level below which growth stops in mg CH2O/m^2.
        buffer_min,
        /// Upper inhibition temperature of 24 h mean canopy temperature in °C.
        t_can_24_max,
        /// Lower inhibition temperature of 24 h mean canopy temperature in °C.
        t_can_24_min,
        /// Upper inhibition temperature of fruit set in °C.
        t_can_max,
        /// Lower inhibition temperature of fruit set in °C.
        t_can_min,
        /// Temperature sum at which the crop is fully generative in °C*day.
        temperature_sum_end,
        /// Dry-matter content of harvested fruit.
        dry_matter_content,
    }
}

impl CropParameters {
    /// Tomato.
    pub fn new() -> Self {
        Self {
            leaf_air_hec: 5.0,
            emissivity: 1.0,
            par_reflection: 0.07,
            nir_reflection: 0.35,
            k1_par: 0.7,
            k2_par: 0.7,
            k_nir: 0.27,
            k_fir: 0.94,
            leaf_heat_capacity: 1.2e3,
            c_evap_1: 4.3,
            c_evap_2: 0.54,
            c_evap_3_day: 6.1e-7,
            c_evap_3_night: 1.1e-11,
            c_evap_4_day: 4.3e-6,
            c_evap_4_night: 5.2e-6,
            stomata_radiation_setpoint: 5.0,
            stomata_switch_slope: -1.0,
            boundary_resistance: 275.0,
            min_stomatal_resistance: 82.0,
            j25_leaf_max: 210.0,
            c_gamma: 1.7,
            stomata_co2_ratio: 0.67,
            activation_energy: 37e3,
            reference_temperature: 298.15,
            entropy_term: 710.0,
            deactivation_energy: 22e4,
            curvature: 0.7,
            light_use_efficiency: 0.385,
            sun_par_photon_ratio: 4.6,
            lai_max: 3.0,
            specific_leaf_area: 2.66e-5,
            relative_growth_rate: 3e-6,
            rgr_coefficient: 2.85e6,
            fruit_max: 300e3,
            fruit_growth_cost: 0.27,
            leaf_growth_cost: 0.28,
            stem_growth_cost: 0.3,
            q10_maintenance: 2.0,
            fruit_maintenance: 1.16e-7,
            leaf_maintenance: 3.47e-7,
            stem_maintenance: 1.47e-7,
            fruit_growth_rate: 0.328,
            leaf_growth_rate: 0.095,
            stem_growth_rate: 0.074,
            buffer_max: 20e3,
            buffer_min: 1e3,
            t_can_24_max: 24.5,
            t_can_24_min: 15.0,
            t_can_max: 34.0,
            t_can_min: 10.0,
            temperature_sum_end: 1035.0,
            dry_matter_content: 0.06,
        }
    }

    /// Leaf pool above which leaves are pruned in mg CH2O/m^2.
    pub fn leaf_max(&self) -> f64 {
        self.lai_max / self.specific_leaf_area
    }
}

impl Default for CropParameters {
    fn default() -> Self {
        Self::new()
    }
}

named_record! {
    /// Climate setpoints and P-band widths of the rule-based controller.
    ///
    /// A negative band means the actuator response grows as the measured value
    /// falls below the setpoint.
    #[serde(default)]
    pub struct ControlSetpoints {
        /// Upper bound of relative humidity in %.
        rh_max,
        /// Heating setpoint by day in °C.
        t_sp_day,
        /// Heating setpoint by night in °C.
        t_sp_night,
        /// P-band of heating in °C.
        heat_band,
        /// Distance below the heating setpoint where ventilation closes for cold, in °C.
        vent_off,
        /// Outdoor temperature below which the screen closes by day, in °C.
        th_scr_sp_day,
        /// Outdoor temperature below which the screen closes by night, in °C.
        th_scr_sp_night,
        /// P-band of screen closure for outdoor cold in °C.
        th_scr_pband,
        /// CO2 setpoint during the light period in ppm.
        co2_sp_day,
        /// P-band of CO2 injection in ppm.
        co2_band,
        /// Excess above the heating setpoint where ventilation starts, in °C.
        heat_dead_zone,
        /// P-band of ventilation for excess heat in °C.
        vent_heat_pband,
        /// P-band of ventilation closure for cold in °C.
        vent_cold_pband,
        /// P-band of ventilation for excess humidity in %.
        vent_rh_pband,
        /// Humidity offset above `rh_max` where the screen opens, in %.
        th_scr_rh,
        /// P-band of screen opening for humidity in %.
        th_scr_rh_pband,
        /// Excess above the heating setpoint where the screen opens, in °C.
        th_scr_dead_zone,
        /// Hour of day at which lamps switch on.
        lamps_on,
        /// Hour of day at which lamps switch off.
        lamps_off,
        /// Day of year after which lamps may be used.
        day_lamp_start,
        /// Day of year after which lamps are not used.
        day_lamp_stop,
        /// Global radiation above which lamps are off, in W/m^2.
        lamps_off_sun,
        /// Daily radiation sum above which lamps stay off, in MJ/(m^2*day).
        lamp_rad_sum_limit,
        /// Excess above the ventilation temperature where lamps switch off, in °C.
        lamp_extra_heat,
        /// Humidity excess above `rh_max` that still allows lamps at night, in %.
        lamp_rh_extra,
    }
}

impl ControlSetpoints {
    pub fn new() -> Self {
        Self {
            rh_max: 90.0,
            t_sp_day: 19.5,
            t_sp_night: 16.5,
            heat_band: -1.0,
            vent_off: 1.0,
            th_scr_sp_day: 5.0,
            th_scr_sp_night: 10.0,
            th_scr_pband: -1.0,
            co2_sp_day: 800.0,
            co2_band: -100.0,
            heat_dead_zone: 5.0,
            vent_heat_pband: 4.0,
            vent_cold_pband: -1.0,
            vent_rh_pband: 5.0,
            th_scr_rh: -2.0,
            th_scr_rh_pband: 2.0,
            th_scr_dead_zone: 4.0,
            lamps_on: 0.0,
            lamps_off: 0.0,
            day_lamp_start: -1.0,
            day_lamp_stop: 400.0,
            lamps_off_sun: 400.0,
            lamp_rad_sum_limit: 10.0,
            lamp_extra_heat: 2.0,
            lamp_rh_extra: 100.0,
        }
    }
}

impl Default for ControlSetpoints {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete, immutable configuration of one simulation run.
///
/// Built once (defaults, preset, TOML file or geometry merge), validated, then
/// shared read-only while stepping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterSet {
    pub constants: PhysicalConstants,
    pub construction: Construction,
    pub cover: CoverProperties,
    pub screen: ThermalScreen,
    pub floor: FloorAndSoil,
    pub heating: HeatingSystem,
    pub lamps: LampProperties,
    pub crop: CropParameters,
    pub control: ControlSetpoints,
}

impl ParameterSet {
    /// Dutch Venlo greenhouse (1.4 ha) with a tomato crop and no lamps.
    pub fn new() -> Self {
        Self::default()
    }

    /// Modern 4 ha greenhouse used to compare climates around the world.
    pub fn world_comparison_4ha() -> Self {
        let mut p = Self::new();
        p.construction.roof_slope_deg = 22.0;
        p.construction.floor_area = 4e4;
        p.construction.cover_area = 4.84e4;
        p.construction.air_height = 6.3;
        p.construction.greenhouse_height = 6.905;
        p.construction.roof_vent_area = 0.1169 * 4e4;
        p.construction.vent_height = 1.3;
        p.construction.discharge_coefficient = 0.75;
        p.heating.pipe_length = 1.25;
        p.heating.boiler_capacity = 300.0;
        p.control.co2_sp_day = 1000.0;
        p.control.t_sp_night = 18.5;
        p.control.t_sp_day = 19.5;
        p.control.rh_max = 87.0;
        p.control.vent_heat_pband = 4.0;
        p.control.vent_rh_pband = 50.0;
        p.control.th_scr_rh_pband = 10.0;
        p.control.lamps_on = 0.0;
        p.control.lamps_off = 18.0;
        p.control.lamps_off_sun = 400.0;
        p.control.lamp_rad_sum_limit = 10.0;
        p
    }

    /// Returns a copy with the given lamp technology installed.
    ///
    /// The lamp schedule is switched on (00:00 to 18:00) unless one is already set.
    pub fn with_lamps(mut self, lamp_type: LampType) -> Self {
        self.lamps = LampProperties::of_type(lamp_type);
        if lamp_type != LampType::None && self.control.lamps_on == self.control.lamps_off {
            self.control.lamps_on = 0.0;
            self.control.lamps_off = 18.0;
        }
        self
    }

    /// Parses a TOML document. Missing sections and fields keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let params: Self = toml::from_str(content).context("Invalid parameter TOML")?;
        params.validate()?;
        Ok(params)
    }

    /// Loads and validates a TOML parameter file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read parameter file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid parameter file {}", path.display()))
    }

    /// Checks finiteness, positivity, ranges and geometric consistency.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let sections: [(&str, Vec<(&'static str, f64)>); 9] = [
            ("constants", self.constants.named_values()),
            ("construction", self.construction.named_values()),
            ("cover", self.cover.named_values()),
            ("screen", self.screen.named_values()),
            ("floor", self.floor.named_values()),
            ("heating", self.heating.named_values()),
            ("lamps", self.lamps.named_values()),
            ("crop", self.crop.named_values()),
            ("control", self.control.named_values()),
        ];
        for (section, values) in &sections {
            for (name, value) in values {
                if !value.is_finite() {
                    return Err(ConfigurationError::NonFinite {
                        name: format!("{section}.{name}"),
                        value: *value,
                    });
                }
            }
        }

        let c = &self.constants;
        let g = &self.construction;
        positive("constants.gas_constant", c.gas_constant)?;
        positive("constants.molar_mass_air", c.molar_mass_air)?;
        positive("constants.latent_heat", c.latent_heat)?;
        positive("constants.psychrometric_constant", c.psychrometric_constant)?;
        positive("constants.air_specific_heat", c.air_specific_heat)?;
        positive("constants.air_density_sea_level", c.air_density_sea_level)?;
        fraction("constants.global_to_air_fraction", c.global_to_air_fraction)?;

        positive("construction.floor_area", g.floor_area)?;
        positive("construction.cover_area", g.cover_area)?;
        positive("construction.air_height", g.air_height)?;
        positive("construction.greenhouse_height", g.greenhouse_height)?;
        non_negative("construction.roof_vent_area", g.roof_vent_area)?;
        non_negative("construction.vent_height", g.vent_height)?;
        non_negative("construction.leakage_coefficient", g.leakage_coefficient)?;
        fraction("construction.leakage_top_fraction", g.leakage_top_fraction)?;
        fraction("construction.insect_screen_factor", g.insect_screen_factor)?;
        in_range("construction.roof_slope_deg", g.roof_slope_deg, 0.0, 89.0)?;
        if g.cover_area < g.floor_area {
            return Err(ConfigurationError::Inconsistent(format!(
                "cover area {} m^2 is smaller than floor area {} m^2",
                g.cover_area, g.floor_area
            )));
        }
        if g.greenhouse_height <= g.air_height {
            return Err(ConfigurationError::Inconsistent(format!(
                "greenhouse height {} m must exceed the main compartment height {} m",
                g.greenhouse_height, g.air_height
            )));
        }
        if g.roof_vent_area > g.cover_area {
            return Err(ConfigurationError::Inconsistent(format!(
                "roof vent area {} m^2 exceeds cover area {} m^2",
                g.roof_vent_area, g.cover_area
            )));
        }

        let cov = &self.cover;
        optical_layer("cover.par", cov.par_transmission, cov.par_reflection)?;
        optical_layer("cover.nir", cov.nir_transmission, cov.nir_reflection)?;
        optical_layer("cover.fir", cov.fir_transmission, cov.fir_reflection)?;
        positive("cover.density", cov.density)?;
        positive("cover.specific_heat", cov.specific_heat)?;
        positive("cover.thickness", cov.thickness)?;
        positive("cover.conductivity", cov.conductivity)?;

        let s = &self.screen;
        optical_layer("screen.par", s.par_transmission, s.par_reflection)?;
        optical_layer("screen.nir", s.nir_transmission, s.nir_reflection)?;
        fraction("screen.fir_transmission", s.fir_transmission)?;
        fraction("screen.fir_emissivity", s.fir_emissivity)?;
        positive("screen.density", s.density)?;
        positive("screen.specific_heat", s.specific_heat)?;
        positive("screen.thickness", s.thickness)?;
        non_negative("screen.permeability", s.permeability)?;

        let f = &self.floor;
        fraction("floor.emissivity", f.emissivity)?;
        fraction("floor.par_reflection", f.par_reflection)?;
        fraction("floor.nir_reflection", f.nir_reflection)?;
        positive("floor.density", f.density)?;
        positive("floor.specific_heat", f.specific_heat)?;
        positive("floor.thickness", f.thickness)?;
        positive("floor.conductivity", f.conductivity)?;
        positive("floor.soil_heat_capacity", f.soil_heat_capacity)?;
        positive("floor.soil_conductivity", f.soil_conductivity)?;
        for (i, h) in f.soil_layers().iter().enumerate() {
            positive(&format!("floor.soil_layer_{}", i + 1), *h)?;
        }
        positive("floor.external_soil_thickness", f.external_soil_thickness)?;

        let h = &self.heating;
        fraction("heating.pipe_emissivity", h.pipe_emissivity)?;
        positive("heating.pipe_outer_diameter", h.pipe_outer_diameter)?;
        positive("heating.pipe_inner_diameter", h.pipe_inner_diameter)?;
        positive("heating.pipe_length", h.pipe_length)?;
        non_negative("heating.boiler_capacity", h.boiler_capacity)?;
        non_negative("heating.co2_injection_capacity", h.co2_injection_capacity)?;
        if h.pipe_inner_diameter >= h.pipe_outer_diameter {
            return Err(ConfigurationError::Inconsistent(format!(
                "pipe inner diameter {} m must be smaller than outer diameter {} m",
                h.pipe_inner_diameter, h.pipe_outer_diameter
            )));
        }
        // Pipes may not shade the whole floor in the FIR view factors.
        if 0.49 * std::f64::consts::PI * h.pipe_length * h.pipe_outer_diameter >= 1.0 {
            return Err(ConfigurationError::Inconsistent(
                "heating pipes cover the entire floor".to_string(),
            ));
        }

        let l = &self.lamps;
        non_negative("lamps.max_intensity", l.max_intensity)?;
        fraction("lamps.par_efficiency", l.par_efficiency)?;
        fraction("lamps.nir_efficiency", l.nir_efficiency)?;
        if l.par_efficiency + l.nir_efficiency > 1.0 {
            return Err(ConfigurationError::Inconsistent(
                "lamp PAR and NIR efficiencies exceed 1".to_string(),
            ));
        }
        optical_layer("lamps.par", l.par_transmission, l.par_reflection)?;
        optical_layer("lamps.nir", l.nir_transmission, l.nir_reflection)?;
        fraction("lamps.fir_transmission", l.fir_transmission)?;
        fraction("lamps.area_fraction", l.area_fraction)?;
        fraction("lamps.emissivity_top", l.emissivity_top)?;
        fraction("lamps.emissivity_bottom", l.emissivity_bottom)?;
        positive("lamps.heat_capacity", l.heat_capacity)?;
        fraction("lamps.cooling_fraction", l.cooling_fraction)?;

        let cr = &self.crop;
        positive("crop.leaf_heat_capacity", cr.leaf_heat_capacity)?;
        positive("crop.specific_leaf_area", cr.specific_leaf_area)?;
        positive("crop.lai_max", cr.lai_max)?;
        positive("crop.fruit_max", cr.fruit_max)?;
        positive("crop.boundary_resistance", cr.boundary_resistance)?;
        positive("crop.min_stomatal_resistance", cr.min_stomatal_resistance)?;
        positive("crop.curvature", cr.curvature)?;
        positive("crop.reference_temperature", cr.reference_temperature)?;
        positive("crop.temperature_sum_end", cr.temperature_sum_end)?;
        in_range("crop.dry_matter_content", cr.dry_matter_content, 1e-3, 1.0)?;

        let ct = &self.control;
        in_range("control.rh_max", ct.rh_max, 1.0, 100.0)?;
        for (name, band) in [
            ("control.heat_band", ct.heat_band),
            ("control.th_scr_pband", ct.th_scr_pband),
            ("control.co2_band", ct.co2_band),
            ("control.vent_heat_pband", ct.vent_heat_pband),
            ("control.vent_cold_pband", ct.vent_cold_pband),
            ("control.vent_rh_pband", ct.vent_rh_pband),
            ("control.th_scr_rh_pband", ct.th_scr_rh_pband),
        ] {
            if band == 0.0 {
                return Err(ConfigurationError::Inconsistent(format!(
                    "{name} must be non-zero"
                )));
            }
        }
        in_range("control.lamps_on", ct.lamps_on, 0.0, 24.0)?;
        in_range("control.lamps_off", ct.lamps_off, 0.0, 24.0)?;
        Ok(())
    }

    /// Capacities and conductances that follow from the parameters.
    pub fn derived(&self) -> DerivedParameters {
        DerivedParameters::new(self)
    }
}

/// Quantities computed once per run from a [`ParameterSet`].
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedParameters {
    /// Atmospheric pressure at the site in Pa.
    pub pressure: f64,
    /// Air density used for sensible heat transport in kg/m^3.
    pub air_density: f64,
    /// Heat capacity of the main compartment air in J/(K*m^2).
    pub cap_air: f64,
    /// Heat capacity of the top compartment air in J/(K*m^2).
    pub cap_top: f64,
    /// CO2 capacity of the main compartment in m.
    pub cap_co2_air: f64,
    /// CO2 capacity of the top compartment in m.
    pub cap_co2_top: f64,
    /// Heat capacity of the internal cover layer in J/(K*m^2).
    pub cap_cov_in: f64,
    /// Heat capacity of the external cover layer in J/(K*m^2).
    pub cap_cov_e: f64,
    /// Heat capacity of the thermal screen in J/(K*m^2).
    pub cap_th_scr: f64,
    /// Heat capacity of the floor in J/(K*m^2).
    pub cap_flr: f64,
    /// Heat capacities of the soil layers in J/(K*m^2).
    pub cap_soil: [f64; 5],
    /// Heat capacity of the heating pipes in J/(K*m^2).
    pub cap_pipe: f64,
    /// Surface of the heating pipes per floor area in m^2/m^2.
    pub pipe_area: f64,
    /// View factor from canopy to floor.
    pub canopy_floor_view: f64,
    /// Conductance through the cover in W/(m^2*K).
    pub cover_conductance: f64,
    /// Conductance between floor and the first soil layer in W/(m^2*K).
    pub floor_soil_conductance: f64,
    /// Conductances between consecutive soil layers; the last entry couples
    /// layer 5 to the external soil boundary. In W/(m^2*K).
    pub soil_conductances: [f64; 5],
    /// Ratio of cover area to floor area.
    pub cover_floor_ratio: f64,
}

impl DerivedParameters {
    pub fn new(p: &ParameterSet) -> Self {
        let c = &p.constants;
        let g = &p.construction;
        let f = &p.floor;
        let h = &p.heating;
        let pi = std::f64::consts::PI;

        let pressure = 101325.0 * (1.0 - 2.5577e-5 * g.elevation).powf(5.25588);
        let air_density = c.air_density_sea_level
            * (c.gravity * c.molar_mass_air * g.elevation / (293.15 * c.gas_constant)).exp();
        let cap_cover = g.roof_slope_deg.to_radians().cos()
            * p.cover.thickness
            * p.cover.density
            * p.cover.specific_heat;

        let layers = f.soil_layers();
        let cap_soil = layers.map(|h| h * f.soil_heat_capacity);
        let mut soil_conductances = [0.0; 5];
        for i in 0..4 {
            soil_conductances[i] = 2.0 * f.soil_conductivity / (layers[i] + layers[i + 1]);
        }
        soil_conductances[4] =
            2.0 * f.soil_conductivity / (layers[4] + f.external_soil_thickness);

        let cap_pipe = 0.25
            * pi
            * h.pipe_length
            * ((h.pipe_outer_diameter.powi(2) - h.pipe_inner_diameter.powi(2))
                * h.steel_density
                * h.steel_specific_heat
                + h.pipe_inner_diameter.powi(2) * h.water_density * h.water_specific_heat);

        Self {
            pressure,
            air_density,
            cap_air: g.air_height * air_density * c.air_specific_heat,
            cap_top: (g.greenhouse_height - g.air_height) * air_density * c.air_specific_heat,
            cap_co2_air: g.air_height,
            cap_co2_top: g.greenhouse_height - g.air_height,
            cap_cov_in: 0.1 * cap_cover,
            cap_cov_e: 0.1 * cap_cover,
            cap_th_scr: p.screen.thickness * p.screen.density * p.screen.specific_heat,
            cap_flr: f.thickness * f.density * f.specific_heat,
            cap_soil,
            cap_pipe,
            pipe_area: pi * h.pipe_length * h.pipe_outer_diameter,
            canopy_floor_view: 1.0 - 0.49 * pi * h.pipe_length * h.pipe_outer_diameter,
            cover_conductance: p.cover.conductivity / p.cover.thickness,
            floor_soil_conductance: 2.0
                / (f.thickness / f.conductivity + layers[0] / f.soil_conductivity),
            soil_conductances,
            cover_floor_ratio: g.cover_area / g.floor_area,
        }
    }
}

fn positive(name: &str, value: f64) -> Result<(), ConfigurationError> {
    if value <= 0.0 {
        return Err(ConfigurationError::NotPositive {
            name: name.to_string(),
            value,
        });
    }
    Ok(())
}

fn non_negative(name: &str, value: f64) -> Result<(), ConfigurationError> {
    in_range(name, value, 0.0, f64::MAX)
}

fn fraction(name: &str, value: f64) -> Result<(), ConfigurationError> {
    in_range(name, value, 0.0, 1.0)
}

fn in_range(name: &str, value: f64, min: f64, max: f64) -> Result<(), ConfigurationError> {
    if value < min || value > max {
        return Err(ConfigurationError::OutOfRange {
            name: name.to_string(),
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn optical_layer(name: &str, tau: f64, rho: f64) -> Result<(), ConfigurationError> {
    fraction(&format!("{name}_transmission"), tau)?;
    fraction(&format!("{name}_reflection"), rho)?;
    if tau + rho > 1.0 + 1e-12 {
        return Err(ConfigurationError::Inconsistent(format!(
            "{name}: transmission + reflection exceeds 1"
        )));
    }
    Ok(())
}
