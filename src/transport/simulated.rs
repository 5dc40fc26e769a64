use std::{thread, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::error::{MeterError, MeterResult};

use super::Transport;

const SAMPLE_PERIOD: Duration = Duration::from_millis(200);
const GLITCH_PROBABILITY: f64 = 0.02;

/// Stand-in for the sensor board when no hardware is attached.
///
/// Produces "T RH Vref VpH" lines around a slowly drifting pH, with the
/// occasional garbled line the way a noisy serial link delivers them.
pub struct SimulatedBoard {
    rng: StdRng,
    temperature_c: f64,
    humidity_pct: f64,
    reference_mv: f64,
    galvanic_mv: f64,
    closed: bool,
}

impl SimulatedBoard {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            rng,
            temperature_c: 25.0,
            humidity_pct: 45.0,
            reference_mv: 100.0,
            galvanic_mv: 0.0,
            closed: false,
        }
    }

    fn next_line(&mut self) -> String {
        if self.rng.gen_bool(GLITCH_PROBABILITY) {
            return format!("{:.2} {:.1}\n", self.temperature_c, self.humidity_pct);
        }

        self.temperature_c =
            (self.temperature_c + self.rng.gen_range(-0.05..0.05)).clamp(15.0, 35.0);
        self.humidity_pct = (self.humidity_pct + self.rng.gen_range(-0.2..0.2)).clamp(20.0, 80.0);
        self.galvanic_mv = (self.galvanic_mv + self.rng.gen_range(-1.5..1.5)).clamp(-300.0, 300.0);
        let reference_mv = self.reference_mv + self.rng.gen_range(-0.3..0.3);
        let ph_mv = reference_mv + self.galvanic_mv + self.rng.gen_range(-0.3..0.3);

        format!(
            "{:.2} {:.1} {:.2} {:.2}\n",
            self.temperature_c, self.humidity_pct, reference_mv, ph_mv
        )
    }
}

impl Default for SimulatedBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimulatedBoard {
    fn name(&self) -> &str {
        "simulated board"
    }

    fn read_line(&mut self, timeout: Duration) -> MeterResult<String> {
        if self.closed {
            return Err(MeterError::TransportUnavailable("simulated board is closed".into()));
        }
        if timeout < SAMPLE_PERIOD {
            thread::sleep(timeout);
            return Err(MeterError::TransportTimeout);
        }
        thread::sleep(SAMPLE_PERIOD);
        Ok(self.next_line())
    }

    fn close(&mut self) -> MeterResult<()> {
        self.closed = true;
        Ok(())
    }
}
