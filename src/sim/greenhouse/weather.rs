use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::horizon::{Horizon, day_index};
use super::psychro;
use super::record::named_record;
use crate::error::CollaboratorError;

const SECONDS_PER_HOUR: f64 = 3600.0;
const SECONDS_PER_DAY: f64 = 86400.0;
const SECONDS_PER_YEAR: f64 = 365.0 * SECONDS_PER_DAY;
const EPW_STEFAN_BOLTZMANN: f64 = 5.6697e-8;
const OUTDOOR_CO2_PPM: f64 = 410.0;
/// Spacing of the fixed grid on which day/night indicators are derived.
const DAY_GRID_S: f64 = 300.0;
/// Grid samples over which the day/night indicator ramps at sunrise and
/// sunset (one hour).
const DAY_TRANSITION_SAMPLES: usize = 12;

named_record! {
    /// Outdoor conditions during one control step.
    #[derive(Default)]
    pub struct WeatherSample {
        /// Seconds since January 1st, 00:00.
        time_s,
        /// Outdoor global radiation in W/m^2.
        i_glob,
        /// Outdoor air temperature in °C.
        t_out,
        /// Outdoor vapor pressure in Pa.
        vp_out,
        /// Outdoor CO2 concentration in mg/m^3.
        co2_out,
        /// Outdoor wind speed in m/s.
        wind,
        /// Sky temperature in °C.
        t_sky,
        /// Temperature of the external soil layer in °C.
        t_so_out,
        /// Radiation sum of the current calendar day in MJ/(m^2*day).
        day_rad_sum,
        /// 1 by day, 0 by night, linear ramp around sunrise and sunset.
        is_day,
        /// Like `is_day` with a sigmoid ramp.
        is_day_smooth,
    }
}

/// A single hourly weather record.
#[derive(Debug, Clone)]
pub struct HourlyRecord {
    /// Month (1-12).
    pub month: u8,
    /// Day of month (1-31).
    pub day: u8,
    /// Hour (1-24), the record covers the hour ending at this time.
    pub hour: u8,
    /// Dry bulb temperature in °C.
    pub dry_bulb_temperature: f64,
    /// Dew point temperature in °C.
    pub dew_point_temperature: f64,
    /// Relative humidity in %.
    pub relative_humidity: f64,
    /// Atmospheric station pressure in Pa.
    pub pressure: f64,
    /// Horizontal infrared radiation intensity in Wh/m^2.
    pub horizontal_infrared: f64,
    /// Global horizontal radiation in Wh/m^2.
    pub global_horizontal_radiation: f64,
    /// Direct normal radiation in Wh/m^2.
    pub direct_normal_radiation: f64,
    /// Diffuse horizontal radiation in Wh/m^2.
    pub diffuse_horizontal_radiation: f64,
    /// Wind speed in m/s.
    pub wind_speed: f64,
    /// Wind direction in degrees from north.
    pub wind_direction: f64,
}

/// Parsed EPW weather data.
#[derive(Debug, Clone)]
pub struct WeatherData {
    /// Location name.
    pub location: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Time zone (hours from UTC).
    pub timezone: f64,
    /// Elevation in meters.
    pub elevation: f64,
    /// Monthly ground temperatures in °C at the depth closest to 2 m, if the
    /// file provides them.
    pub ground_temperatures: Option<[f64; 12]>,
    /// Hourly records, one year.
    pub records: Vec<HourlyRecord>,
}

impl WeatherData {
    /// Parses EPW (EnergyPlus Weather) file content.
    ///
    /// EPW format: 8 header lines followed by hourly data rows of 35
    /// comma-separated fields. Malformed rows are skipped.
    pub fn from_epw(content: &str) -> Result<Self> {
        let lines: Vec<&str> = content.lines().collect();
        anyhow::ensure!(
            lines.len() >= 9,
            "EPW file too short: expected at least 9 lines"
        );

        // LOCATION,city,state_province,country,source,WMO,lat,lon,tz,elevation
        let location_fields: Vec<&str> = lines[0].split(',').collect();
        anyhow::ensure!(location_fields.len() >= 10, "Invalid LOCATION header");

        let location = format!(
            "{}, {}",
            location_fields[1].trim(),
            location_fields[3].trim()
        );
        let latitude = parse_field(&location_fields, 6, "latitude", 0)?;
        let longitude = parse_field(&location_fields, 7, "longitude", 0)?;
        let timezone = parse_field(&location_fields, 8, "timezone", 0)?;
        let elevation = parse_field(&location_fields, 9, "elevation", 0)?;

        let ground_temperatures = lines
            .iter()
            .take(8)
            .find(|l| l.starts_with("GROUND TEMPERATURES"))
            .and_then(|l| parse_ground_temperatures(l));

        let mut records = Vec::new();
        for (i, line) in lines.iter().enumerate().skip(8) {
            let f: Vec<&str> = line.split(',').collect();
            if f.len() < 35 {
                continue;
            }
            records.push(HourlyRecord {
                month: parse_field(&f, 1, "month", i)?,
                day: parse_field(&f, 2, "day", i)?,
                hour: parse_field(&f, 3, "hour", i)?,
                dry_bulb_temperature: parse_field(&f, 6, "dry bulb", i)?,
                dew_point_temperature: parse_field(&f, 7, "dew point", i)?,
                relative_humidity: parse_field(&f, 8, "RH", i)?,
                pressure: parse_field(&f, 9, "pressure", i)?,
                horizontal_infrared: parse_field(&f, 12, "horizontal IR", i)?,
                global_horizontal_radiation: parse_field(&f, 13, "GHR", i)?,
                direct_normal_radiation: parse_field(&f, 14, "DNR", i)?,
                diffuse_horizontal_radiation: parse_field(&f, 15, "DHR", i)?,
                wind_direction: parse_field(&f, 20, "wind dir", i)?,
                wind_speed: parse_field(&f, 21, "wind speed", i)?,
            });
        }
        anyhow::ensure!(!records.is_empty(), "EPW file has no hourly records");

        Ok(Self {
            location,
            latitude,
            longitude,
            timezone,
            elevation,
            ground_temperatures,
            records,
        })
    }

    pub fn from_epw_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read EPW file {}", path.display()))?;
        Self::from_epw(&content).with_context(|| format!("Invalid EPW file {}", path.display()))
    }

    /// Creates a synthetic year for testing.
    ///
    /// Generates 8760 hours with an annual and a daily temperature cycle and a
    /// parabolic daytime radiation profile.
    pub fn synthetic(
        location: &str,
        latitude: f64,
        longitude: f64,
        mean_temp: f64,
        temp_amplitude: f64,
    ) -> Self {
        let mut records = Vec::with_capacity(8760);
        let days_in_month: [u16; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];

        for month_idx in 0..12 {
            for day in 1..=days_in_month[month_idx] {
                let day_of_year =
                    days_in_month[..month_idx].iter().sum::<u16>() as f64 + day as f64;
                // Warmest around day 200
                let annual_phase = 2.0 * std::f64::consts::PI * (day_of_year - 200.0) / 365.0;
                for hour in 1..=24u16 {
                    // Warmest at 14:00
                    let daily_phase = 2.0 * std::f64::consts::PI * (hour as f64 - 14.0) / 24.0;
                    let temp =
                        mean_temp + temp_amplitude * annual_phase.cos() + 3.0 * daily_phase.cos();

                    let solar_altitude_factor = if (7..=19).contains(&hour) {
                        let solar_hour = (hour as f64 - 12.0) / 6.0;
                        (1.0 - solar_hour * solar_hour).max(0.0)
                    } else {
                        0.0
                    };
                    let ghr = 800.0 * solar_altitude_factor;
                    let rh = 70.0;
                    let vp = rh / 100.0 * psychro::saturation_vapor_pressure(temp);
                    let sky_k = temp - 20.0 + 273.15;

                    records.push(HourlyRecord {
                        month: (month_idx + 1) as u8,
                        day: day as u8,
                        hour: hour as u8,
                        dry_bulb_temperature: temp,
                        dew_point_temperature: dew_point(vp),
                        relative_humidity: rh,
                        pressure: 101325.0,
                        horizontal_infrared: EPW_STEFAN_BOLTZMANN * sky_k.powi(4),
                        global_horizontal_radiation: ghr,
                        direct_normal_radiation: ghr * 0.6,
                        diffuse_horizontal_radiation: ghr * 0.4,
                        wind_speed: 3.0,
                        wind_direction: 180.0,
                    });
                }
            }
        }

        Self {
            location: location.to_string(),
            latitude,
            longitude,
            timezone: 0.0,
            elevation: 0.0,
            ground_temperatures: None,
            records,
        }
    }

    /// Returns the number of hours in the dataset.
    pub fn num_hours(&self) -> usize {
        self.records.len()
    }

    /// Returns the mean dry-bulb temperature.
    pub fn mean_temperature(&self) -> f64 {
        if self.records.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.records.iter().map(|r| r.dry_bulb_temperature).sum();
        sum / self.records.len() as f64
    }

    /// External soil temperature at `time_s`.
    ///
    /// Monthly ground temperatures are placed at mid-month and interpolated
    /// linearly around the year. Without a ground-temperature header the mean
    /// air temperature is used.
    pub fn soil_temperature(&self, time_s: f64) -> f64 {
        let Some(months) = self.ground_temperatures else {
            return self.mean_temperature();
        };
        let month_len = SECONDS_PER_YEAR / 12.0;
        let x = time_s.rem_euclid(SECONDS_PER_YEAR) / month_len - 0.5;
        let i0 = x.floor().rem_euclid(12.0) as usize;
        let i1 = (i0 + 1) % 12;
        let frac = x - x.floor();
        months[i0] + frac * (months[i1] - months[i0])
    }

    /// Converts record `i` to model inputs. Day indicators and sums stay zero.
    fn sample_at_record(&self, i: usize) -> WeatherSample {
        let r = &self.records[i];
        let t_out = r.dry_bulb_temperature;
        // EPW marks missing infrared as 9999
        let t_sky = if r.horizontal_infrared > 0.0 && r.horizontal_infrared < 9999.0 {
            (r.horizontal_infrared / EPW_STEFAN_BOLTZMANN).powf(0.25) - 273.15
        } else {
            t_out - 20.0
        };
        WeatherSample {
            i_glob: r.global_horizontal_radiation.max(0.0),
            t_out,
            vp_out: r.relative_humidity.clamp(0.0, 100.0) / 100.0
                * psychro::saturation_vapor_pressure(t_out),
            co2_out: psychro::co2_ppm_to_mg(t_out, OUTDOOR_CO2_PPM),
            wind: r.wind_speed.max(0.0),
            t_sky,
            ..WeatherSample::default()
        }
    }
}

fn parse_field<T>(fields: &[&str], index: usize, name: &str, line: usize) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw = fields
        .get(index)
        .with_context(|| format!("Missing {name} at line {line}"))?;
    raw.trim()
        .parse()
        .with_context(|| format!("Invalid {name} at line {line}"))
}

/// `GROUND TEMPERATURES,n,[depth,conductivity,density,specific heat,12 x T]...`
fn parse_ground_temperatures(line: &str) -> Option<[f64; 12]> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    let count: usize = fields.get(1)?.parse().ok()?;
    let mut best: Option<(f64, [f64; 12])> = None;
    for d in 0..count {
        let start = 2 + d * 16;
        let block = fields.get(start..start + 16)?;
        let depth: f64 = block[0].parse().ok()?;
        let mut months = [0.0; 12];
        for (m, raw) in block[4..].iter().enumerate() {
            months[m] = raw.parse().ok()?;
        }
        let dist = (depth - 2.0).abs();
        if best.is_none_or(|(b, _)| dist < b) {
            best = Some((dist, months));
        }
    }
    best.map(|(_, months)| months)
}

fn dew_point(vp: f64) -> f64 {
    let g = (vp / 610.78).ln();
    238.3 * g / (17.2694 - g)
}

/// Source of outdoor conditions.
///
/// Implementations return instantaneous values; day sums and day/night
/// indicators are derived by [`WeatherSeries`].
pub trait WeatherProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Outdoor conditions at `time_s` seconds after January 1st, 00:00.
    fn reading(&self, time_s: f64) -> Result<WeatherSample>;
}

/// Hourly data set interpolated linearly to arbitrary times.
///
/// The record for hour `h` of day `d` applies at the end of that hour. The
/// data set is treated as periodic, so a typical year wraps around.
#[derive(Debug, Clone)]
pub struct HourlyWeather {
    data: Arc<WeatherData>,
}

impl HourlyWeather {
    pub fn new(data: Arc<WeatherData>) -> Self {
        Self { data }
    }

    pub fn data(&self) -> &WeatherData {
        &self.data
    }
}

impl WeatherProvider for HourlyWeather {
    fn name(&self) -> &str {
        &self.data.location
    }

    fn reading(&self, time_s: f64) -> Result<WeatherSample> {
        let n = self.data.records.len();
        anyhow::ensure!(n > 0, "weather data set is empty");
        anyhow::ensure!(time_s.is_finite(), "weather requested at non-finite time");

        let x = (time_s / SECONDS_PER_HOUR - 1.0).rem_euclid(n as f64);
        let i0 = (x.floor() as usize).min(n - 1);
        let i1 = (i0 + 1) % n;
        let frac = x - i0 as f64;

        let a = self.data.sample_at_record(i0).values();
        let b = self.data.sample_at_record(i1).values();
        let mixed: Vec<f64> = a
            .iter()
            .zip(&b)
            .map(|(a, b)| a + frac * (b - a))
            .collect();
        let mut sample = WeatherSample::from_values(&mixed)
            .context("weather sample layout mismatch")?;
        sample.time_s = time_s;
        sample.t_so_out = self.data.soil_temperature(time_s);
        Ok(sample)
    }
}

/// Smooth daily cycle for tests and demonstrations.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtificialWeather;

impl WeatherProvider for ArtificialWeather {
    fn name(&self) -> &str {
        "artificial"
    }

    fn reading(&self, time_s: f64) -> Result<WeatherSample> {
        let phase = (2.0 * std::f64::consts::PI * time_s / SECONDS_PER_DAY).sin();
        let t_out = 5.0 * phase + 15.0;
        Ok(WeatherSample {
            time_s,
            i_glob: 350.0 * phase.max(0.0),
            t_out,
            vp_out: psychro::vapor_density_to_pressure(t_out, 0.006),
            co2_out: psychro::co2_ppm_to_mg(t_out, OUTDOOR_CO2_PPM),
            wind: 1.0,
            t_sky: t_out - 20.0,
            t_so_out: 20.0,
            ..WeatherSample::default()
        })
    }
}

/// Wraps a provider and overwrites selected outdoor quantities.
///
/// Used to build controlled scenarios (dark, windless, fixed temperature).
pub struct ConstantOverrides<P> {
    pub inner: P,
    pub i_glob: Option<f64>,
    pub t_out: Option<f64>,
    pub vp_out: Option<f64>,
    pub wind: Option<f64>,
}

impl<P: WeatherProvider> ConstantOverrides<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            i_glob: None,
            t_out: None,
            vp_out: None,
            wind: None,
        }
    }
}

impl<P: WeatherProvider> WeatherProvider for ConstantOverrides<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn reading(&self, time_s: f64) -> Result<WeatherSample> {
        let mut s = self.inner.reading(time_s)?;
        if let Some(v) = self.i_glob {
            s.i_glob = v;
        }
        if let Some(v) = self.t_out {
            s.t_out = v;
            s.t_sky = v - 20.0;
        }
        if let Some(v) = self.vp_out {
            s.vp_out = v;
        }
        if let Some(v) = self.wind {
            s.wind = v;
        }
        Ok(s)
    }
}

/// Weather for every step of a horizon, materialized before the run starts.
#[derive(Debug, Clone)]
pub struct WeatherSeries {
    pub samples: Vec<WeatherSample>,
}

impl WeatherSeries {
    /// Samples `provider` at the start of every step of `horizon`.
    ///
    /// Day indicators are derived on a fixed 5-minute grid anchored at
    /// January 1st, 00:00, and interpolated to the step times. The ramp at
    /// sunrise and sunset therefore lasts one hour whatever the step, and
    /// contiguous horizons see identical values at their seam.
    pub fn materialize(
        provider: &dyn WeatherProvider,
        horizon: &Horizon,
    ) -> Result<Self, CollaboratorError> {
        let fail = |e: anyhow::Error| CollaboratorError::new("weather", format!("{e:#}"));
        let n = horizon.num_steps();
        let grid = DayGrid::build(provider, horizon.start_s, horizon.end_s()).map_err(fail)?;

        let mut day_sums: BTreeMap<i64, f64> = BTreeMap::new();
        let mut samples = Vec::with_capacity(n);
        for j in 0..n {
            let t = horizon.time_at(j);
            let mut s = provider.reading(t).map_err(fail)?;
            s.time_s = t;
            s.is_day = grid.linear_at(t);
            s.is_day_smooth = grid.smooth_at(t);
            let day = day_index(t);
            s.day_rad_sum = match day_sums.get(&day) {
                Some(v) => *v,
                None => {
                    let v = day_radiation_sum(provider, day).map_err(fail)?;
                    day_sums.insert(day, v);
                    v
                }
            };
            if let Some((name, value)) = s.first_non_finite() {
                return Err(CollaboratorError::new(
                    "weather",
                    format!("non-finite {name} = {value} at t = {} s", s.time_s),
                ));
            }
            samples.push(s);
        }
        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&WeatherSample> {
        self.samples.get(index)
    }
}

/// Radiation sum of calendar day `day` in MJ/m^2, sampled on the day grid.
fn day_radiation_sum(provider: &dyn WeatherProvider, day: i64) -> Result<f64> {
    let n = (SECONDS_PER_DAY / DAY_GRID_S) as usize;
    let dt = DAY_GRID_S;
    let start = day as f64 * SECONDS_PER_DAY;
    let mut sum = 0.0;
    for k in 0..n {
        sum += provider.reading(start + k as f64 * dt)?.i_glob;
    }
    Ok(sum * dt * 1e-6)
}

/// Day/night indicators on the fixed grid covering a horizon.
struct DayGrid {
    /// Grid index of `linear[0]`.
    first: i64,
    linear: Vec<f64>,
    smooth: Vec<f64>,
}

impl DayGrid {
    fn build(provider: &dyn WeatherProvider, start_s: f64, end_s: f64) -> Result<Self> {
        let pad = DAY_TRANSITION_SAMPLES as i64;
        let first = (start_s / DAY_GRID_S).floor() as i64 - pad;
        let last = (end_s / DAY_GRID_S).ceil() as i64 + pad;
        let mut raw = Vec::with_capacity((last - first + 1).max(0) as usize);
        for k in first..=last {
            raw.push(provider.reading(k as f64 * DAY_GRID_S)?.i_glob > 0.0);
        }
        Ok(Self {
            first,
            linear: day_indicator(&raw, |x| x),
            smooth: day_indicator(&raw, |x| 1.0 / (1.0 + (-10.0 * (x - 0.5)).exp())),
        })
    }

    fn linear_at(&self, time_s: f64) -> f64 {
        self.interpolate(&self.linear, time_s)
    }

    fn smooth_at(&self, time_s: f64) -> f64 {
        self.interpolate(&self.smooth, time_s)
    }

    fn interpolate(&self, values: &[f64], time_s: f64) -> f64 {
        let x = time_s / DAY_GRID_S - self.first as f64;
        let last = values.len().saturating_sub(1);
        let i0 = (x.floor().max(0.0) as usize).min(last);
        let i1 = (i0 + 1).min(last);
        let frac = (x - i0 as f64).clamp(0.0, 1.0);
        values[i0] + frac * (values[i1] - values[i0])
    }
}

/// 0/1 day flags with a ramp of [`DAY_TRANSITION_SAMPLES`] centered on each
/// sunrise and sunset.
fn day_indicator(raw: &[bool], shape: impl Fn(f64) -> f64) -> Vec<f64> {
    let n = DAY_TRANSITION_SAMPLES;
    let ramp: Vec<f64> = (0..n).map(|i| shape(i as f64 / (n - 1) as f64)).collect();
    let mut out: Vec<f64> = raw.iter().map(|&d| if d { 1.0 } else { 0.0 }).collect();
    let half = n / 2;
    for k in half..raw.len().saturating_sub(half) {
        let rising = !raw[k] && raw[k + 1];
        let falling = raw[k] && !raw[k + 1];
        if !rising && !falling {
            continue;
        }
        for (i, r) in ramp.iter().enumerate() {
            out[k - half + i] = if rising { *r } else { 1.0 - r };
        }
    }
    out
}
