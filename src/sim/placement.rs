//! Node position allocators: places nodes via a grid or a uniform-disk
//! allocator.
//!
//! Grounded on `original_source/examples/cottoncandy-sim.cc`'s two
//! `ns3::PositionAllocator`s: a 10-wide `GridPositionAllocator` and a
//! `UniformDiscPositionAllocator` centered on the gateway.

use rand::Rng;

use crate::tracker::Position;

/// Row-first grid, 10 columns wide, spaced `grid_delta` meters apart and
/// centered on the origin (where the gateway sits).
pub fn grid_positions(num_nodes: u32, grid_delta: f64) -> Vec<Position> {
    const GRID_WIDTH: i64 = 10;
    let min_x = -(GRID_WIDTH as f64) / 2.0 * grid_delta + grid_delta / 2.0;
    let min_y = min_x;
    (0..num_nodes)
        .map(|i| {
            let row = i as i64 / GRID_WIDTH;
            let col = i as i64 % GRID_WIDTH;
            Position {
                x: min_x + col as f64 * grid_delta,
                y: min_y + row as f64 * grid_delta,
            }
        })
        .collect()
}

/// Uniform placement over a disk of radius `radius` centered on the origin.
pub fn disk_positions(num_nodes: u32, radius: f64, rng: &mut impl Rng) -> Vec<Position> {
    (0..num_nodes)
        .map(|_| {
            // Sampling r as sqrt(u) * radius keeps the areal density uniform
            // rather than bunching points near the center.
            let r = radius * rng.gen_range(0.0..=1.0f64).sqrt();
            let theta = rng.gen_range(0.0..std::f64::consts::TAU);
            Position {
                x: r * theta.cos(),
                y: r * theta.sin(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn grid_is_centered_on_origin() {
        let positions = grid_positions(100, 2000.0);
        assert_eq!(positions.len(), 100);
        let sum_x: f64 = positions.iter().map(|p| p.x).sum();
        let sum_y: f64 = positions.iter().map(|p| p.y).sum();
        assert!(sum_x.abs() < 1e-6);
        assert!(sum_y.abs() < 1e-6);
    }

    #[test]
    fn disk_positions_stay_within_radius() {
        let mut rng = StdRng::seed_from_u64(7);
        let positions = disk_positions(200, 500.0, &mut rng);
        assert_eq!(positions.len(), 200);
        for p in positions {
            assert!((p.x * p.x + p.y * p.y).sqrt() <= 500.0 + 1e-6);
        }
    }
}
