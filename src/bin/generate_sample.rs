use std::io::Write;

use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Normal deviate by the Box-Muller transform.
fn gauss(rng: &mut impl Rng, mean: f64, std_dev: f64) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(1e-15);
    let u2: f64 = rng.gen();
    mean + std_dev * (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

const NGAS: usize = 500;
const GAS_MASS: f64 = 1.0 / NGAS as f64;
const SINK_MASS: f64 = 0.05;
const HFACT: f64 = 1.2;

/// Sink positions and velocities: (x, y, z, vx, vy, vz).
const SINKS: [[f64; 6]; 2] = [
    [0.5, 0.0, 0.0, 0.0, 0.7, 0.0],
    [-0.5, 0.0, 0.0, 0.0, -0.7, 0.0],
];

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let mut rng = StdRng::seed_from_u64(42);

    // Gaussian gas blob in solid-body rotation plus two sinks.
    let sigma = 0.3;
    let omega = 0.5;
    let mut rows: Vec<[f64; 9]> = Vec::with_capacity(NGAS + SINKS.len());
    for _ in 0..NGAS {
        let (x, y, z) = (
            gauss(&mut rng, 0.0, sigma),
            gauss(&mut rng, 0.0, sigma),
            gauss(&mut rng, 0.0, 0.5 * sigma),
        );
        let r2 = x * x + y * y + 4.0 * z * z;
        let rho = 1.0 / (2.0 * std::f64::consts::PI * sigma * sigma).powf(1.5)
            * (-r2 / (2.0 * sigma * sigma)).exp();
        let h = HFACT * (GAS_MASS / rho.max(1e-12)).cbrt();
        let (vx, vy, vz) = (
            -omega * y + gauss(&mut rng, 0.0, 0.01),
            omega * x + gauss(&mut rng, 0.0, 0.01),
            gauss(&mut rng, 0.0, 0.01),
        );
        let divv = gauss(&mut rng, 0.0, 0.05);
        rows.push([x, y, z, vx, vy, vz, h, divv, 1.0]);
    }
    for [x, y, z, vx, vy, vz] in SINKS {
        rows.push([x, y, z, vx, vy, vz, 0.05, 0.0, 3.0]);
    }

    let output_path = "sample_dump.csv";
    let mut file = std::fs::File::create(output_path)
        .with_context(|| format!("creating {output_path}"))?;
    writeln!(file, "# time = 1.0")?;
    writeln!(file, "# gamma = 1.6666667")?;
    writeln!(file, "# hfact = {HFACT}")?;
    writeln!(file, "# nparttot = {}", rows.len())?;
    writeln!(file, "# massoftype(1) = {GAS_MASS}")?;
    writeln!(file, "# massoftype(3) = {SINK_MASS}")?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["x", "y", "z", "vx", "vy", "vz", "h", "divv", "itype"])?;
    for row in &rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;

    println!(
        "Wrote {} particles ({NGAS} gas, {} sinks) to {output_path}",
        rows.len(),
        SINKS.len()
    );
    Ok(())
}
