use super::{sealed, Visualize, BACKGROUND};
use crate::{Point, PropertyDescriptor, PropertyStore, Result, Rgba, SignalAnalyzer, Surface};

const CONNECTION_COLOR: Rgba = Rgba::rgb(76, 201, 240);
const BASE_MAX_SPEED: f32 = 2.0;
const LOUDNESS_SPEED: f32 = 3.0;
const JITTER: f32 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct Particle {
    pub position: Point,
    pub velocity: Point,
    /// Radius before audio and `particleSize` scaling.
    pub base_radius: f32,
    /// Radius drawn on the next frame.
    pub radius: f32,
    pub color: Rgba,
}

/// Field of drifting discs whose speed and size follow the frequency bin
/// assigned to each particle. Particles leaving the surface wrap to the
/// opposite edge.
#[derive(Debug)]
pub struct ParticleVisualization {
    properties: PropertyStore,
    particles: Vec<Particle>,
    width: u32,
    height: u32,
    rng: fastrand::Rng,
}

impl ParticleVisualization {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_rng(width, height, fastrand::Rng::new())
    }

    /// Deterministic particle field for reproducible output.
    pub fn with_seed(width: u32, height: u32, seed: u64) -> Self {
        Self::with_rng(width, height, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(width: u32, height: u32, rng: fastrand::Rng) -> Self {
        let properties = PropertyStore::new()
            .declare(PropertyDescriptor::new("particleCount", 50.0, 1.0, 500.0, 1.0))
            .declare(PropertyDescriptor::new("particleSize", 1.0, 0.5, 5.0, 0.5))
            .declare(PropertyDescriptor::new(
                "connectionDistance",
                100.0,
                0.0,
                300.0,
                10.0,
            ));

        let mut field = Self {
            properties,
            particles: Vec::new(),
            width,
            height,
            rng,
        };
        field.reinitialize();
        field
    }

    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    fn particle_count(&self) -> usize {
        self.properties.get("particleCount").unwrap_or(50.0).round() as usize
    }

    fn particle_size(&self) -> f32 {
        self.properties.get("particleSize").unwrap_or(1.0)
    }

    /// Replaces the whole particle set according to `particleCount`.
    fn reinitialize(&mut self) {
        let count = self.particle_count();
        let size = self.particle_size();
        let (width, height) = (self.width as f32, self.height as f32);

        self.particles = (0..count)
            .map(|_| {
                let base_radius = self.rng.f32() * 3.0 + 1.0;
                Particle {
                    position: Point::new(self.rng.f32() * width, self.rng.f32() * height),
                    velocity: Point::new(
                        (self.rng.f32() - 0.5) * 2.0,
                        (self.rng.f32() - 0.5) * 2.0,
                    ),
                    base_radius,
                    radius: base_radius * size,
                    color: Rgba::from_hsl(self.rng.f32() * 360.0, 1.0, 0.5),
                }
            })
            .collect();

        tracing::debug!(count, "particle field reinitialised");
    }

    fn wrap(value: f32, extent: f32) -> f32 {
        if extent <= 0.0 {
            value
        } else {
            let wrapped = value.rem_euclid(extent);
            if wrapped >= extent {
                0.0
            } else {
                wrapped
            }
        }
    }
}

impl sealed::Sealed for ParticleVisualization {}

impl Visualize for ParticleVisualization {
    fn name(&self) -> &'static str {
        "Particles"
    }

    fn update(&mut self, analyzer: &SignalAnalyzer) {
        let bins = analyzer.frequency();
        let max_speed = BASE_MAX_SPEED + analyzer.loudness() * LOUDNESS_SPEED;
        let size = self.particle_size();
        let (width, height) = (self.width as f32, self.height as f32);
        let count = self.particles.len();

        for (index, particle) in self.particles.iter_mut().enumerate() {
            let intensity = if bins.is_empty() {
                0.0
            } else {
                bins[index * bins.len() / count].clamp(0.0, 1.0)
            };

            if intensity > 0.0 {
                particle.velocity.x += (self.rng.f32() - 0.5) * intensity * JITTER;
                particle.velocity.y += (self.rng.f32() - 0.5) * intensity * JITTER;
            }

            let speed = particle.velocity.distance(Point::default());
            if speed > max_speed {
                particle.velocity.x = particle.velocity.x / speed * max_speed;
                particle.velocity.y = particle.velocity.y / speed * max_speed;
            }

            let boost = 1.0 + intensity;
            particle.position.x =
                Self::wrap(particle.position.x + particle.velocity.x * boost, width);
            particle.position.y =
                Self::wrap(particle.position.y + particle.velocity.y * boost, height);
            particle.radius = particle.base_radius * size * boost;
        }
    }

    fn draw(&self, _analyzer: &SignalAnalyzer, surface: &mut dyn Surface) -> Result<()> {
        surface.clear(BACKGROUND)?;

        for particle in &self.particles {
            surface.fill_circle(particle.position, particle.radius, &particle.color.into())?;
        }

        let max_distance = self.properties.get("connectionDistance").unwrap_or(0.0);
        if max_distance <= 0.0 {
            return Ok(());
        }

        for (i, first) in self.particles.iter().enumerate() {
            for second in &self.particles[i + 1..] {
                let distance = first.position.distance(second.position);
                if distance < max_distance {
                    let opacity = (1.0 - distance / max_distance) * 0.5;
                    surface.stroke_line(
                        first.position,
                        second.position,
                        1.0,
                        &CONNECTION_COLOR.with_opacity(opacity).into(),
                    )?;
                }
            }
        }

        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        let scale_x = if self.width > 0 {
            width as f32 / self.width as f32
        } else {
            1.0
        };
        let scale_y = if self.height > 0 {
            height as f32 / self.height as f32
        } else {
            1.0
        };

        for particle in &mut self.particles {
            particle.position.x = Self::wrap(particle.position.x * scale_x, width as f32);
            particle.position.y = Self::wrap(particle.position.y * scale_y, height as f32);
        }
        self.width = width;
        self.height = height;
    }

    fn properties(&self) -> &PropertyStore {
        &self.properties
    }

    fn set_property(&mut self, key: &str, value: f32) -> bool {
        if !self.properties.set(key, value) {
            return false;
        }

        match key {
            "particleCount" => self.reinitialize(),
            "particleSize" => {
                let size = self.particle_size();
                for particle in &mut self.particles {
                    particle.radius = particle.base_radius * size;
                }
            }
            _ => {}
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        visualization::test_support::{analyzer_with, tone},
        RecordingSurface,
    };

    fn still_particle(x: f32, y: f32, vx: f32, vy: f32) -> Particle {
        Particle {
            position: Point::new(x, y),
            velocity: Point::new(vx, vy),
            base_radius: 2.0,
            radius: 2.0,
            color: Rgba::rgb(255, 255, 255),
        }
    }

    #[test]
    fn particle_count_change_rebuilds_the_field() {
        let mut field = ParticleVisualization::with_seed(300, 200, 7);
        assert_eq!(field.particles().len(), 50);

        assert!(field.set_property("particleCount", 120.0));
        assert_eq!(field.particles().len(), 120);
        assert_eq!(field.properties().get("particleCount"), Some(120.0));

        assert!(!field.set_property("particleCount", 0.0));
        assert_eq!(field.particles().len(), 120);
    }

    #[test]
    fn reported_count_matches_the_field() {
        let mut field = ParticleVisualization::with_seed(300, 200, 7);
        assert!(field.set_property("particleCount", 17.5));

        let reported = field.properties().get("particleCount").unwrap();
        assert_eq!(reported, 18.0);
        assert_eq!(field.particles().len(), reported as usize);
    }

    #[test]
    fn wrap_stays_below_the_extent() {
        let wrapped = ParticleVisualization::wrap(-1e-6, 100.0);
        assert!((0.0..100.0).contains(&wrapped));
        assert_eq!(ParticleVisualization::wrap(100.0, 100.0), 0.0);
        assert_eq!(ParticleVisualization::wrap(-25.0, 100.0), 75.0);
    }

    #[test]
    fn particles_wrap_to_the_opposite_edge() {
        let analyzer = analyzer_with(&[0.0; 64]);
        let mut field = ParticleVisualization::with_seed(100, 100, 1);
        field.particles = vec![
            still_particle(99.5, 50.0, 1.0, 0.0),
            still_particle(0.5, 0.5, -1.0, -1.0),
        ];

        field.update(&analyzer);

        let positions: Vec<Point> = field.particles().iter().map(|p| p.position).collect();
        assert!((positions[0].x - 0.5).abs() < 1e-4);
        assert!((positions[1].x - 99.5).abs() < 1e-4);
        assert!((positions[1].y - 99.5).abs() < 1e-4);
    }

    #[test]
    fn louder_bins_move_faster_and_grow() {
        let quiet = analyzer_with(&[0.0; 64]);
        let loud = analyzer_with(&tone(1, 64, 1.0));
        assert!(loud.frequency()[0] > 0.0);

        let mut calm = ParticleVisualization::with_seed(1000, 1000, 3);
        calm.particles = vec![still_particle(500.0, 500.0, 1.0, 0.0)];
        calm.update(&quiet);

        let mut excited = ParticleVisualization::with_seed(1000, 1000, 3);
        excited.particles = vec![still_particle(500.0, 500.0, 1.0, 0.0)];
        excited.update(&loud);

        let calm_step = calm.particles()[0].position.distance(Point::new(500.0, 500.0));
        let excited_step = excited.particles()[0]
            .position
            .distance(Point::new(500.0, 500.0));
        assert!(excited_step > calm_step);
        assert!(excited.particles()[0].radius > calm.particles()[0].radius);
    }

    #[test]
    fn draw_renders_every_particle_and_nearby_links() {
        let analyzer = analyzer_with(&[0.0; 64]);
        let mut field = ParticleVisualization::with_seed(400, 400, 5);
        field.particles = vec![
            still_particle(10.0, 10.0, 0.0, 0.0),
            still_particle(20.0, 10.0, 0.0, 0.0),
            still_particle(390.0, 390.0, 0.0, 0.0),
        ];

        let mut surface = RecordingSurface::new(400, 400);
        surface.begin_frame();
        field.draw(&analyzer, &mut surface).unwrap();
        surface.commit_frame();

        assert_eq!(surface.circles(), 3);
        let links = surface.count(|c| matches!(c, crate::surface::DrawCommand::StrokeLine { .. }));
        assert_eq!(links, 1);
    }

    #[test]
    fn resize_keeps_particles_inside() {
        let mut field = ParticleVisualization::with_seed(200, 200, 9);
        field.resize(50, 20);

        assert!(field
            .particles()
            .iter()
            .all(|p| (0.0..50.0).contains(&p.position.x) && (0.0..20.0).contains(&p.position.y)));
    }
}
