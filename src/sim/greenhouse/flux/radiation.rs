//! Shortwave (PAR, NIR) and far-infrared exchange.

use super::FluxInputs;
use super::exchange::{Layer, fir};
use crate::sim::greenhouse::control::ActuatorPosition;
use crate::sim::greenhouse::params::ParameterSet;
use crate::sim::greenhouse::record::named_record;

/// Lumped optical properties of roof, thermal screen and lamp layer at the
/// current screen position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverOptics {
    pub par: Layer,
    pub nir: Layer,
    /// FIR transmission of the roof alone.
    pub fir_transmission: f64,
    /// FIR emissivity (absorption) of the roof.
    pub fir_emissivity: f64,
    /// FIR transmission of the thermal screen at its current position.
    pub screen_fir_transmission: f64,
}

impl CoverOptics {
    pub fn new(p: &ParameterSet, u: &ActuatorPosition) -> Self {
        let roof = &p.cover;
        let scr = &p.screen;
        let lamp = &p.lamps;
        let th = u.th_scr;

        let screen_par = Layer::symmetric(
            1.0 - th * (1.0 - scr.par_transmission),
            th * scr.par_reflection,
        );
        let screen_nir = Layer::symmetric(
            1.0 - th * (1.0 - scr.nir_transmission),
            th * scr.nir_reflection,
        );
        let par = Layer::symmetric(roof.par_transmission, roof.par_reflection)
            .stack(screen_par)
            .stack(Layer::symmetric(lamp.par_transmission, lamp.par_reflection));
        let nir = Layer::symmetric(roof.nir_transmission, roof.nir_reflection)
            .stack(screen_nir)
            .stack(Layer::symmetric(lamp.nir_transmission, lamp.nir_reflection));

        Self {
            par,
            nir,
            fir_transmission: roof.fir_transmission,
            fir_emissivity: 1.0 - roof.fir_transmission - roof.fir_reflection,
            screen_fir_transmission: 1.0 - th * (1.0 - scr.fir_transmission),
        }
    }
}

named_record! {
    /// Radiative exchange in W/m^2 floor.
    #[derive(Default)]
    pub struct RadiationFluxes {
        /// Global radiation (PAR + NIR) above the canopy, sun and lamps.
        r_can,
        r_par_sun_can,
        r_par_lamp_can,
        r_nir_sun_can,
        r_nir_lamp_can,
        r_par_sun_flr,
        r_par_lamp_flr,
        r_nir_sun_flr,
        r_nir_lamp_flr,
        /// Lamp PAR and NIR absorbed by the air and construction elements.
        r_lamp_air,
        /// Global radiation absorbed by construction elements, attributed to the air.
        r_glob_sun_air,
        /// Global radiation absorbed by the cover.
        r_glob_sun_cov_e,
        r_can_cov_in,
        r_can_sky,
        r_can_th_scr,
        r_can_flr,
        r_pipe_cov_in,
        r_pipe_sky,
        r_pipe_th_scr,
        r_pipe_flr,
        r_pipe_can,
        r_flr_cov_in,
        r_flr_sky,
        r_flr_th_scr,
        r_th_scr_cov_in,
        r_th_scr_sky,
        r_cov_e_sky,
        r_fir_lamp_flr,
        r_lamp_pipe,
        r_fir_lamp_can,
        r_lamp_th_scr,
        r_lamp_cov_in,
        r_lamp_sky,
    }
}

pub(crate) fn compute(inp: &FluxInputs) -> RadiationFluxes {
    let p = inp.p;
    let d = inp.d;
    let x = &inp.x;
    let w = &inp.w;
    let c = &p.constants;
    let cr = &p.crop;
    let fl = &p.floor;
    let lp = &p.lamps;
    let lai = inp.lai;
    let q = inp.q_lamp_in;
    let i_glob = w.i_glob;
    let optics = CoverOptics::new(p, &inp.u);

    // Shortwave
    let sun_share = 1.0 - c.global_to_air_fraction;
    let r_par_gh_sun = sun_share * optics.par.tau * c.global_par_fraction * i_glob;
    let r_par_gh_lamp = lp.par_efficiency * q;
    let r_can = sun_share
        * i_glob
        * (c.global_par_fraction * optics.par.tau + c.global_nir_fraction * optics.nir.tau)
        + (lp.par_efficiency + lp.nir_efficiency) * q;

    let ext_k1 = (-cr.k1_par * lai).exp();
    let ext_k2 = (-cr.k2_par * lai).exp();
    let down = (1.0 - cr.par_reflection) * (1.0 - ext_k1);
    let up = ext_k1 * fl.par_reflection * (1.0 - cr.par_reflection) * (1.0 - ext_k2);
    let r_par_sun_can = r_par_gh_sun * (down + up);
    let r_par_lamp_can = r_par_gh_lamp * (down + up);
    let r_par_sun_flr = (1.0 - fl.par_reflection) * ext_k1 * r_par_gh_sun;
    let r_par_lamp_flr = (1.0 - fl.par_reflection) * ext_k1 * r_par_gh_lamp;

    let ext_nir = (-cr.k_nir * lai).exp();
    let cover_nir = Layer::symmetric(1.0 - optics.nir.rho_up, optics.nir.rho_up);
    let canopy_nir = Layer::symmetric(ext_nir, cr.nir_reflection * (1.0 - ext_nir));
    let floor_nir = Layer::symmetric(1.0 - fl.nir_reflection, fl.nir_reflection);
    let column = cover_nir.stack(canopy_nir).stack(floor_nir);
    let a_can_nir = column.absorption();
    let a_flr_nir = column.tau;
    let r_nir_sun_can = sun_share * a_can_nir * c.global_nir_fraction * i_glob;
    let r_nir_sun_flr = sun_share * a_flr_nir * c.global_nir_fraction * i_glob;
    let r_nir_lamp_can = lp.nir_efficiency * q * (1.0 - cr.nir_reflection) * (1.0 - ext_nir);
    let r_nir_lamp_flr = (1.0 - fl.nir_reflection) * ext_nir * lp.nir_efficiency * q;

    let r_lamp_air = (lp.par_efficiency + lp.nir_efficiency) * q
        - r_par_lamp_can
        - r_nir_lamp_can
        - r_par_lamp_flr
        - r_nir_lamp_flr;
    let r_glob_sun_air = c.global_to_air_fraction
        * i_glob
        * (optics.par.tau * c.global_par_fraction
            + (a_can_nir + a_flr_nir) * c.global_nir_fraction);
    let r_glob_sun_cov_e = (optics.par.absorption() * c.global_par_fraction
        + optics.nir.absorption() * c.global_nir_fraction)
        * i_glob;

    // Far infrared
    let sigma = c.stefan_boltzmann;
    let eps_sky = c.sky_emissivity;
    let eps_cov = optics.fir_emissivity;
    let eps_can = cr.emissivity;
    let eps_flr = fl.emissivity;
    let eps_pipe = p.heating.pipe_emissivity;
    let eps_scr = p.screen.fir_emissivity;
    let tau_cov = optics.fir_transmission;
    let tau_scr = optics.screen_fir_transmission;
    let tau_lamp = lp.fir_transmission;
    let th = inp.u.th_scr;
    let ext_fir = (-cr.k_fir * lai).exp();
    let a_can = 1.0 - ext_fir;
    let a_pipe = d.pipe_area;
    let a_lamp = lp.area_fraction;
    // Fraction of the floor view not blocked by pipes.
    let f_flr = d.canopy_floor_view;
    let f_pipe = 0.49 * ext_fir;
    let (t_can, t_cov_in, t_sky) = (x.t_can, x.t_cov_in, w.t_sky);
    let (t_pipe, t_flr, t_scr, t_lamp) = (x.t_pipe, x.t_flr, x.t_th_scr, x.t_lamp);

    RadiationFluxes {
        r_can,
        r_par_sun_can,
        r_par_lamp_can,
        r_nir_sun_can,
        r_nir_lamp_can,
        r_par_sun_flr,
        r_par_lamp_flr,
        r_nir_sun_flr,
        r_nir_lamp_flr,
        r_lamp_air,
        r_glob_sun_air,
        r_glob_sun_cov_e,
        r_can_cov_in: fir(a_can, eps_can, eps_cov, tau_lamp * tau_scr, t_can, t_cov_in, sigma),
        r_can_sky: fir(a_can, eps_can, eps_sky, tau_lamp * tau_cov * tau_scr, t_can, t_sky, sigma),
        r_can_th_scr: fir(a_can, eps_can, eps_scr, tau_lamp * th, t_can, t_scr, sigma),
        r_can_flr: fir(a_can, eps_can, eps_flr, f_flr, t_can, t_flr, sigma),
        r_pipe_cov_in: fir(
            a_pipe,
            eps_pipe,
            eps_cov,
            tau_lamp * tau_scr * f_pipe,
            t_pipe,
            t_cov_in,
            sigma,
        ),
        r_pipe_sky: fir(
            a_pipe,
            eps_pipe,
            eps_sky,
            tau_lamp * tau_cov * tau_scr * f_pipe,
            t_pipe,
            t_sky,
            sigma,
        ),
        r_pipe_th_scr: fir(a_pipe, eps_pipe, eps_scr, tau_lamp * th * f_pipe, t_pipe, t_scr, sigma),
        r_pipe_flr: fir(a_pipe, eps_pipe, eps_flr, 0.49, t_pipe, t_flr, sigma),
        r_pipe_can: fir(a_pipe, eps_pipe, eps_can, 0.49 * a_can, t_pipe, t_can, sigma),
        r_flr_cov_in: fir(
            1.0,
            eps_flr,
            eps_cov,
            tau_lamp * tau_scr * f_flr * ext_fir,
            t_flr,
            t_cov_in,
            sigma,
        ),
        r_flr_sky: fir(
            1.0,
            eps_flr,
            eps_sky,
            tau_lamp * tau_cov * tau_scr * f_flr * ext_fir,
            t_flr,
            t_sky,
            sigma,
        ),
        r_flr_th_scr: fir(
            1.0,
            eps_flr,
            eps_scr,
            tau_lamp * th * f_flr * ext_fir,
            t_flr,
            t_scr,
            sigma,
        ),
        r_th_scr_cov_in: fir(1.0, eps_scr, eps_cov, th, t_scr, t_cov_in, sigma),
        r_th_scr_sky: fir(1.0, eps_scr, eps_sky, tau_cov * th, t_scr, t_sky, sigma),
        r_cov_e_sky: fir(1.0, eps_cov, eps_sky, 1.0, x.t_cov_e, t_sky, sigma),
        r_fir_lamp_flr: fir(
            a_lamp,
            lp.emissivity_bottom,
            eps_flr,
            f_flr * ext_fir,
            t_lamp,
            t_flr,
            sigma,
        ),
        r_lamp_pipe: fir(
            a_lamp,
            lp.emissivity_bottom,
            eps_pipe,
            (1.0 - f_flr) * ext_fir,
            t_lamp,
            t_pipe,
            sigma,
        ),
        r_fir_lamp_can: fir(a_lamp, lp.emissivity_bottom, eps_can, a_can, t_lamp, t_can, sigma),
        r_lamp_th_scr: fir(a_lamp, lp.emissivity_top, eps_scr, th, t_lamp, t_scr, sigma),
        r_lamp_cov_in: fir(a_lamp, lp.emissivity_top, eps_cov, tau_scr, t_lamp, t_cov_in, sigma),
        r_lamp_sky: fir(
            a_lamp,
            lp.emissivity_top,
            eps_sky,
            tau_cov * tau_scr,
            t_lamp,
            t_sky,
            sigma,
        ),
    }
}
