use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Interference shape injected into a synthetic baseline. Arrays are shaped
/// `(channels, timesteps)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RfiEvent {
    /// One channel occupied for the whole observation.
    Narrowband { channel: usize },
    /// One timestep occupied over the whole band.
    Broadband { timestep: usize },
    Spike { channel: usize, timestep: usize },
}

impl RfiEvent {
    pub fn apply(&self, samples: &mut Array2<f32>, amplitude: f32) {
        match *self {
            RfiEvent::Narrowband { channel } => {
                samples.row_mut(channel).mapv_inplace(|v| v + amplitude)
            }
            RfiEvent::Broadband { timestep } => {
                samples.column_mut(timestep).mapv_inplace(|v| v + amplitude)
            }
            RfiEvent::Spike { channel, timestep } => samples[[channel, timestep]] += amplitude,
        }
    }

    pub fn mark(&self, truth: &mut Array2<bool>) {
        match *self {
            RfiEvent::Narrowband { channel } => truth.row_mut(channel).fill(true),
            RfiEvent::Broadband { timestep } => truth.column_mut(timestep).fill(true),
            RfiEvent::Spike { channel, timestep } => truth[[channel, timestep]] = true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrowband_fills_a_row() {
        let mut samples = Array2::<f32>::zeros((4, 6));
        let mut truth = Array2::from_elem((4, 6), false);
        let event = RfiEvent::Narrowband { channel: 2 };
        event.apply(&mut samples, 5.0);
        event.mark(&mut truth);
        assert_eq!(samples.row(2).sum(), 30.0);
        assert_eq!(samples.sum(), 30.0);
        assert_eq!(truth.iter().filter(|&&t| t).count(), 6);
    }

    #[test]
    fn broadband_and_spike_overlap_add_up() {
        let mut samples = Array2::<f32>::zeros((3, 3));
        RfiEvent::Broadband { timestep: 1 }.apply(&mut samples, 2.0);
        RfiEvent::Spike {
            channel: 0,
            timestep: 1,
        }
        .apply(&mut samples, 3.0);
        assert_eq!(samples[[0, 1]], 5.0);
        assert_eq!(samples[[2, 1]], 2.0);
        assert_eq!(samples[[2, 2]], 0.0);
    }
}
