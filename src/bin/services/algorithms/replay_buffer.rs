use burn::prelude::*;
use burn::tensor::TensorData;
use rand::seq::IteratorRandom;
use rand::Rng;
use crate::error::SacError;

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub state: Vec<f32>,
    pub action: usize,
    pub reward: f32,
    pub next_state: Vec<f32>,
    pub done: bool,
}

/// Fixed-capacity ring of transitions; once full, each push overwrites the oldest entry.
pub struct ReplayBuffer {
    storage: Vec<Transition>,
    pos: usize,
    capacity: usize,
}

impl ReplayBuffer {
    pub fn new(capacity: usize) -> Self {
        Self { storage: Vec::with_capacity(capacity.min(1 << 20)), pos: 0, capacity: capacity.max(1) }
    }

    pub fn push(&mut self, transition: Transition) {
        if self.storage.len() < self.capacity {
            self.storage.push(transition);
        } else {
            self.storage[self.pos] = transition;
        }
        self.pos = (self.pos + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Stored transitions, oldest first.
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &Transition> {
        let split = if self.storage.len() < self.capacity { 0 } else { self.pos };
        self.storage[split..].iter().chain(self.storage[..split].iter())
    }

    /// Uniform batch without replacement; successive batches are independent draws.
    pub fn sample(&self, batch_size: usize, rng: &mut impl Rng) -> Result<Vec<&Transition>, SacError> {
        if batch_size > self.storage.len() {
            return Err(SacError::BufferUnderfilled { len: self.storage.len(), batch: batch_size });
        }
        Ok(self.storage.iter().choose_multiple(rng, batch_size))
    }
}

/// A sampled mini-batch laid out as tensors: `[n, state]`, `[n, 1]` actions,
/// `[n, 1]` rewards, `[n, state]` next states, `[n, 1]` done flags (0.0 / 1.0).
pub struct TransitionBatch<B: Backend> {
    pub states: Tensor<B, 2>,
    pub actions: Tensor<B, 2, Int>,
    pub rewards: Tensor<B, 2>,
    pub next_states: Tensor<B, 2>,
    pub dones: Tensor<B, 2>,
}

impl<B: Backend> TransitionBatch<B> {
    pub fn from_transitions(batch: &[&Transition], state_size: usize, device: &B::Device) -> Result<Self, SacError> {
        let n = batch.len();
        let mut s_buf = Vec::with_capacity(n * state_size);
        let mut s2_buf = Vec::with_capacity(n * state_size);
        let mut a_buf = Vec::with_capacity(n);
        let mut r_buf = Vec::with_capacity(n);
        let mut d_buf = Vec::with_capacity(n);

        for t in batch {
            for s in [&t.state, &t.next_state] {
                if s.len() != state_size {
                    return Err(SacError::InvalidObservation {
                        got: s.len(),
                        expected: state_size,
                        min: state_size,
                    });
                }
            }
            s_buf.extend_from_slice(&t.state);
            s2_buf.extend_from_slice(&t.next_state);
            a_buf.push(t.action as i64);
            r_buf.push(t.reward);
            d_buf.push(if t.done { 1.0f32 } else { 0.0 });
        }

        Ok(Self {
            states: Tensor::from_data(TensorData::new(s_buf, [n, state_size]), device),
            actions: Tensor::from_data(TensorData::new(a_buf, [n, 1]), device),
            rewards: Tensor::from_data(TensorData::new(r_buf, [n, 1]), device),
            next_states: Tensor::from_data(TensorData::new(s2_buf, [n, state_size]), device),
            dones: Tensor::from_data(TensorData::new(d_buf, [n, 1]), device),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256PlusPlus;
    use std::collections::HashSet;

    fn transition(i: usize) -> Transition {
        Transition {
            state: vec![i as f32; 8],
            action: i % 3,
            reward: i as f32,
            next_state: vec![i as f32 + 1.0; 8],
            done: i % 5 == 0,
        }
    }

    #[test]
    fn evicts_oldest_first() {
        let capacity = 10;
        let k = 4;
        let mut buffer = ReplayBuffer::new(capacity);
        for i in 0..capacity + k {
            buffer.push(transition(i));
        }

        assert_eq!(buffer.len(), capacity);
        let kept: Vec<f32> = buffer.iter().map(|t| t.reward).collect();
        let expected: Vec<f32> = (k..capacity + k).map(|i| i as f32).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn iter_is_chronological_before_wrapping() {
        let mut buffer = ReplayBuffer::new(5);
        for i in 0..3 {
            buffer.push(transition(i));
        }
        let kept: Vec<f32> = buffer.iter().map(|t| t.reward).collect();
        assert_eq!(kept, vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn batch_has_no_duplicates() {
        let mut buffer = ReplayBuffer::new(50);
        for i in 0..50 {
            buffer.push(transition(i));
        }
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        for _ in 0..20 {
            let batch = buffer.sample(50, &mut rng).unwrap();
            let distinct: HashSet<u32> = batch.iter().map(|t| t.reward as u32).collect();
            assert_eq!(distinct.len(), 50);
        }
    }

    #[test]
    fn refuses_batch_larger_than_contents() {
        let mut buffer = ReplayBuffer::new(8);
        buffer.push(transition(0));
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(1);
        assert!(matches!(
            buffer.sample(2, &mut rng),
            Err(SacError::BufferUnderfilled { len: 1, batch: 2 })
        ));
    }

    #[test]
    fn batch_tensors_have_expected_shapes() {
        let device = Default::default();
        let items: Vec<Transition> = (0..4).map(transition).collect();
        let refs: Vec<&Transition> = items.iter().collect();
        let batch = TransitionBatch::<NdArray<f32>>::from_transitions(&refs, 8, &device).unwrap();

        assert_eq!(batch.states.dims(), [4, 8]);
        assert_eq!(batch.actions.dims(), [4, 1]);
        assert_eq!(batch.rewards.dims(), [4, 1]);
        assert_eq!(batch.dones.into_data().to_vec::<f32>().unwrap(), vec![1.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn batch_rejects_wrong_width() {
        let device = Default::default();
        let t = transition(1);
        let result = TransitionBatch::<NdArray<f32>>::from_transitions(&[&t], 9, &device);
        assert!(result.is_err());
    }
}
