// pedfuse_core/src/estimation/filters/particle.rs

//! A sequential Monte Carlo position filter over geodetic particles.
//!
//! Every cycle runs motion, weighting, normalization and resampling in that
//! order. Resampling happens on every cycle, without an effective sample
//! size gate.

use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, StandardNormal};
use tracing::{debug, warn};

use crate::config::ParticleConfig;
use crate::error::FilterError;
use crate::estimation::{FilterKind, PositionFilter};
use crate::frames::{clamped_cos, meters_per_degree, ReferenceFrame};
use crate::messages::{ControlInput, Estimate, Observation};
use crate::types::{is_valid_covariance, wrap_longitude, Covariance, GeoPoint, Position};

/// One hypothesis of the pedestrian's position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: GeoPoint,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct ParticleEstimator {
    frame: ReferenceFrame,
    config: ParticleConfig,
    rng: ChaCha8Rng,
    motion_noise: Normal<f64>,
    particles: Vec<Particle>,
    // Last known valid estimate.
    position: GeoPoint,
    covariance: Covariance,
    timestamp: f64,
}

impl ParticleEstimator {
    pub fn new(
        frame: ReferenceFrame,
        position: GeoPoint,
        covariance: Covariance,
        config: ParticleConfig,
    ) -> Result<Self, FilterError> {
        config.validate()?;
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let motion_noise = Normal::new(0.0, config.motion_noise)
            .map_err(|e| FilterError::config(format!("particle.motion_noise: {e}")))?;
        let mut filter = Self {
            frame,
            rng,
            motion_noise,
            particles: Vec::with_capacity(config.count),
            config,
            position: frame.anchor(),
            covariance: Covariance::identity(),
            timestamp: 0.0,
        };
        filter.reset(Position::Geodetic(position), covariance)?;
        Ok(filter)
    }

    /// A read-only view of the current particle set.
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// `1 / Σ wᵢ²`, between 1 (collapsed) and N (uniform).
    pub fn effective_sample_size(&self) -> f64 {
        let sum_sq: f64 = self.particles.iter().map(|p| p.weight * p.weight).sum();
        if sum_sq > 0.0 {
            1.0 / sum_sq
        } else {
            0.0
        }
    }

    /// One full cycle with any number of observations. Missing or invalid
    /// observations contribute nothing; with no usable observation the
    /// cycle still normalizes and resamples.
    pub fn fuse_cycle(
        &mut self,
        control: Option<&ControlInput>,
        observations: &[Observation],
    ) -> Result<Estimate, FilterError> {
        if let Some(control) = control {
            control.validate()?;
            self.move_particles(control);
            self.timestamp = control.timestamp;
        }
        for observation in observations {
            match observation.validate().and_then(|()| self.weigh(observation)) {
                Ok(()) => self.timestamp = self.timestamp.max(observation.timestamp),
                Err(e) => debug!(source = %observation.source, error = %e, "skipping observation"),
            }
        }
        self.normalize();
        self.resample();
        Ok(self.refresh_estimate())
    }

    // --- Cycle Stages ---

    fn move_particles(&mut self, control: &ControlInput) {
        let dx = control.displacement.x;
        let dy = control.displacement.y;
        let rng = &mut self.rng;
        for particle in self.particles.iter_mut() {
            let p = &mut particle.position;
            let (north_scale, east_scale) = meters_per_degree(p.latitude);
            let jitter_lat = self.motion_noise.sample(rng);
            let jitter_lon = self.motion_noise.sample(rng) / clamped_cos(p.latitude);
            *p = GeoPoint::new(
                p.latitude + dy / north_scale + jitter_lat,
                p.longitude + dx / east_scale + jitter_lon,
            )
            .normalized();
        }
    }

    /// Fails without touching any weight when the observation does not
    /// resolve to a real fix.
    fn weigh(&mut self, observation: &Observation) -> Result<(), FilterError> {
        let z = self.frame.checked_geodetic(&observation.position)?;
        let sigma = self.config.noise(observation.source);
        let two_sigma_sq = 2.0 * sigma * sigma;
        for particle in self.particles.iter_mut() {
            let d_lat = particle.position.latitude - z.latitude;
            let d_lon = wrap_longitude(particle.position.longitude - z.longitude);
            particle.weight *= (-(d_lat * d_lat + d_lon * d_lon) / two_sigma_sq).exp();
        }
        Ok(())
    }

    fn normalize(&mut self) {
        let n = self.particles.len();
        if n == 0 {
            return;
        }
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        if total > 0.0 && total.is_finite() {
            for particle in self.particles.iter_mut() {
                particle.weight /= total;
            }
        } else {
            warn!(total, "particle weights collapsed, resetting to uniform");
            let uniform = 1.0 / n as f64;
            for particle in self.particles.iter_mut() {
                particle.weight = uniform;
            }
        }
    }

    /// Multinomial resampling: N independent uniforms, each located in the
    /// cumulative weights by binary search.
    fn resample(&mut self) {
        let n = self.particles.len();
        if n == 0 {
            return;
        }
        let mut cumulative = Vec::with_capacity(n);
        let mut running = 0.0;
        for particle in &self.particles {
            running += particle.weight;
            cumulative.push(running);
        }
        let uniform = 1.0 / n as f64;
        let resampled: Vec<Particle> = (0..n)
            .map(|_| {
                let u = self.rng.gen::<f64>() * running;
                let index = cumulative.partition_point(|&c| c <= u).min(n - 1);
                Particle {
                    position: self.particles[index].position,
                    weight: uniform,
                }
            })
            .collect();
        self.particles = resampled;
    }

    /// Weighted mean and metric sample covariance of the particle set. An
    /// invalid result keeps the last known valid estimate.
    fn refresh_estimate(&mut self) -> Estimate {
        let total: f64 = self.particles.iter().map(|p| p.weight).sum();
        if self.particles.is_empty() || total <= 0.0 || !total.is_finite() {
            return self.estimate();
        }

        // Longitudes are averaged as offsets from the last estimate so a
        // cloud straddling the antimeridian does not average to the far side.
        let reference = self.position.longitude;
        let (lat, d_lon) = self.particles.iter().fold((0.0, 0.0), |(lat, d_lon), p| {
            (
                lat + p.weight * p.position.latitude,
                d_lon + p.weight * wrap_longitude(p.position.longitude - reference),
            )
        });
        let mean = GeoPoint::new(lat / total, wrap_longitude(reference + d_lon / total));
        if !mean.is_valid() {
            warn!(?mean, "particle mean is not a valid fix, keeping last estimate");
            return self.estimate();
        }

        let (north_scale, east_scale) = meters_per_degree(mean.latitude);
        let mut covariance = Covariance::zeros();
        for p in &self.particles {
            let d = Vector2::new(
                wrap_longitude(p.position.longitude - mean.longitude) * east_scale,
                (p.position.latitude - mean.latitude) * north_scale,
            );
            covariance += d * d.transpose() * p.weight;
        }
        covariance /= total;

        self.position = mean;
        self.covariance = covariance;
        debug!(?mean, ess = self.effective_sample_size(), "particle estimate");
        self.estimate()
    }

    fn estimate(&self) -> Estimate {
        Estimate {
            position: Position::Geodetic(self.position),
            covariance: self.covariance,
            timestamp: self.timestamp,
        }
    }

    /// Draws the particle set from `N(center, covariance)`, covariance in
    /// metres². Falls back to the diagonal when Cholesky fails on a
    /// semi-definite matrix.
    fn scatter(&mut self, center: GeoPoint, covariance: &Covariance) {
        let l = match covariance.cholesky() {
            Some(chol) => chol.l(),
            None => Covariance::from_diagonal(&covariance.diagonal().map(f64::sqrt)),
        };
        let (north_scale, east_scale) = meters_per_degree(center.latitude);
        let uniform = 1.0 / self.config.count as f64;
        let rng = &mut self.rng;
        self.particles = (0..self.config.count)
            .map(|_| {
                let z = Vector2::new(
                    rng.sample::<f64, _>(StandardNormal),
                    rng.sample::<f64, _>(StandardNormal),
                );
                let offset = l * z;
                Particle {
                    position: GeoPoint::new(
                        center.latitude + offset.y / north_scale,
                        center.longitude + offset.x / east_scale,
                    )
                    .normalized(),
                    weight: uniform,
                }
            })
            .collect();
    }
}

impl PositionFilter for ParticleEstimator {
    fn kind(&self) -> FilterKind {
        FilterKind::Particle
    }

    /// The given pair is reported verbatim until the next cycle replaces it
    /// with particle statistics.
    fn reset(&mut self, position: Position, covariance: Covariance) -> Result<(), FilterError> {
        let geo = self.frame.resolve_geodetic(&position);
        if !geo.is_valid() {
            return Err(FilterError::invalid(format!(
                "cannot reset to invalid position {position:?}"
            )));
        }
        if !is_valid_covariance(&covariance) {
            return Err(FilterError::invalid(format!(
                "cannot reset with invalid covariance {covariance:?}"
            )));
        }
        self.scatter(geo, &covariance);
        self.position = geo;
        self.covariance = covariance;
        self.timestamp = 0.0;
        Ok(())
    }

    fn predict(&mut self, control: &ControlInput) -> Result<Estimate, FilterError> {
        control.validate()?;
        self.move_particles(control);
        self.timestamp = control.timestamp;
        Ok(self.refresh_estimate())
    }

    fn update(&mut self, observation: &Observation) -> Result<Estimate, FilterError> {
        if let Err(e) = observation.validate().and_then(|()| self.weigh(observation)) {
            debug!(source = %observation.source, error = %e, "rejecting observation");
            return Err(e);
        }
        self.normalize();
        self.resample();
        self.timestamp = observation.timestamp;
        Ok(self.refresh_estimate())
    }

    fn position(&self) -> Position {
        Position::Geodetic(self.position)
    }

    fn covariance(&self) -> Covariance {
        self.covariance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::SensorSource;
    use crate::types::LocalPoint;
    use approx::assert_abs_diff_eq;

    const ANCHOR: GeoPoint = GeoPoint::new(55.9227, -3.1746);

    fn config(count: usize, seed: u64) -> ParticleConfig {
        ParticleConfig {
            count,
            seed: Some(seed),
            ..Default::default()
        }
    }

    fn filter(config: ParticleConfig) -> ParticleEstimator {
        let frame = ReferenceFrame::new(ANCHOR).unwrap();
        ParticleEstimator::new(frame, ANCHOR, Covariance::identity() * 25.0, config).unwrap()
    }

    fn local(pf: &ParticleEstimator) -> LocalPoint {
        pf.frame.resolve_local(&pf.position())
    }

    fn weight_sum(pf: &ParticleEstimator) -> f64 {
        pf.particles().iter().map(|p| p.weight).sum()
    }

    #[test]
    fn reset_scatters_around_the_position() {
        let pf = filter(config(2000, 1));
        assert_eq!(pf.particles().len(), 2000);
        let mean_lat: f64 =
            pf.particles().iter().map(|p| p.position.latitude).sum::<f64>() / 2000.0;
        // 5 m σ over 2000 draws: the sample mean is well within a metre.
        assert!(((mean_lat - ANCHOR.latitude) * 111_320.0).abs() < 1.0);
        assert_abs_diff_eq!(weight_sum(&pf), 1.0, epsilon = 1e-9);
        assert_eq!(pf.position(), Position::Geodetic(ANCHOR));
        assert_eq!(pf.covariance(), Covariance::identity() * 25.0);
    }

    #[test]
    fn weights_are_normalized_then_uniform_after_resampling() {
        let mut pf = filter(config(500, 2));
        let fix = GeoPoint::new(ANCHOR.latitude + 1e-4, ANCHOR.longitude);
        pf.weigh(&Observation::new(fix, SensorSource::Gnss, 1.0)).unwrap();
        pf.normalize();
        assert_abs_diff_eq!(weight_sum(&pf), 1.0, epsilon = 1e-9);

        pf.resample();
        for p in pf.particles() {
            assert_abs_diff_eq!(p.weight, 1.0 / 500.0, epsilon = 1e-15);
        }
        assert_abs_diff_eq!(pf.effective_sample_size(), 500.0, epsilon = 1e-6);
    }

    #[test]
    fn zero_likelihood_recovers_uniform_weights() {
        let mut pf = filter(config(300, 3));
        let far_away = Observation::new(GeoPoint::new(10.0, 50.0), SensorSource::Wifi, 1.0);
        let estimate = pf.update(&far_away).unwrap();
        assert!(pf.particles().iter().all(|p| p.weight.is_finite()));
        assert_abs_diff_eq!(weight_sum(&pf), 1.0, epsilon = 1e-9);
        assert!(estimate.position.is_valid());

        for p in pf.particles.iter_mut() {
            p.weight = 0.0;
        }
        pf.normalize();
        assert!(pf.particles().iter().all(|p| p.weight == 1.0 / 300.0));
    }

    #[test]
    fn predict_translates_the_cloud() {
        let mut pf = filter(ParticleConfig {
            motion_noise: 0.0,
            ..config(400, 4)
        });
        pf.predict(&ControlInput::new(0.0, 1.0, 0.5, 0.5)).unwrap();
        let before = local(&pf);
        let estimate = pf.predict(&ControlInput::new(0.0, 10.0, 5.0, 5.5)).unwrap();
        let after = pf.frame.resolve_local(&estimate.position);
        assert_abs_diff_eq!(after.y - before.y, 10.0, epsilon = 1e-6);
        assert_eq!(estimate.timestamp, 5.5);
    }

    #[test]
    fn update_pulls_toward_the_observation() {
        let mut pf = filter(ParticleConfig {
            gnss_noise: 5e-5,
            ..config(1000, 5)
        });
        let fix = GeoPoint::new(ANCHOR.latitude + 10.0 / 111_320.0, ANCHOR.longitude);
        let estimate = pf.update(&Observation::new(fix, SensorSource::Gnss, 1.0)).unwrap();
        let pos = local(&pf);
        assert!(pos.y > 1.0 && pos.y < 10.0);
        assert!(is_valid_covariance(&estimate.covariance));
        assert!(estimate.covariance.trace() < 50.0);
    }

    #[test]
    fn invalid_observation_leaves_particles_alone() {
        let mut pf = filter(config(100, 6));
        let before = pf.particles().to_vec();
        let null = Observation::new(GeoPoint::new(0.0, 0.0), SensorSource::Gnss, 1.0);
        assert!(pf.update(&null).is_err());
        assert_eq!(pf.particles(), before.as_slice());

        // In a full cycle the same fix is just skipped.
        let estimate = pf.fuse_cycle(None, &[null]).unwrap();
        assert!(estimate.position.is_valid());
    }

    #[test]
    fn local_fix_beyond_the_pole_does_not_collapse_weights() {
        let mut pf = filter(config(200, 8));
        let mut twin = filter(config(200, 8));
        let beyond = Observation::new(LocalPoint::new(0.0, 1e8), SensorSource::Gnss, 1.0);
        assert!(beyond.validate().is_ok());

        let before = pf.particles().to_vec();
        assert!(matches!(pf.update(&beyond), Err(FilterError::InvalidInput(_))));
        assert_eq!(pf.particles(), before.as_slice());

        // Skipped inside a cycle: identical to a cycle with no observation.
        let skipped = pf.fuse_cycle(None, &[beyond]).unwrap();
        let empty = twin.fuse_cycle(None, &[]).unwrap();
        assert_eq!(pf.particles(), twin.particles());
        assert_eq!(skipped.position, empty.position);
    }

    #[test]
    fn cloud_crosses_the_antimeridian() {
        let start = GeoPoint::new(55.9227, 179.9999);
        let frame = ReferenceFrame::new(start).unwrap();
        let mut pf =
            ParticleEstimator::new(frame, start, Covariance::identity(), config(300, 9)).unwrap();
        let estimate = pf.predict(&ControlInput::new(200.0, 0.0, 1.0, 1.0)).unwrap();
        let geo = estimate.position.as_geodetic().unwrap();
        assert!(geo.is_valid());
        assert!(geo.longitude < -179.99, "{geo:?}");
        assert!(pf.particles().iter().all(|p| p.position.is_valid()));
        // About 200 m east of the start, not half a world away.
        assert_abs_diff_eq!(frame.to_local(&geo).x, 200.0, epsilon = 5.0);
        assert!(estimate.covariance.trace() < 10.0);
    }

    #[test]
    fn reset_clears_the_timestamp() {
        let mut pf = filter(config(50, 10));
        pf.predict(&ControlInput::new(1.0, 0.0, 1.0, 7.0)).unwrap();
        assert_eq!(pf.estimate().timestamp, 7.0);
        pf.reset(Position::Geodetic(ANCHOR), Covariance::identity())
            .unwrap();
        assert_eq!(pf.estimate().timestamp, 0.0);
    }

    #[test]
    fn same_seed_same_trajectory() {
        let run = || {
            let mut pf = filter(config(250, 42));
            let step = ControlInput::new(0.7, 0.2, 0.5, 0.5);
            let wifi = Observation::new(
                GeoPoint::new(ANCHOR.latitude + 2e-5, ANCHOR.longitude + 1e-5),
                SensorSource::Wifi,
                0.5,
            );
            pf.fuse_cycle(Some(&step), &[wifi]).unwrap();
            pf.particles().to_vec()
        };
        assert_eq!(run(), run());
    }
}
