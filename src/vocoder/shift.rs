#[derive(Debug, Clone)]
pub struct ShiftBuffer {
    data: Vec<f32>,
    frame_size: usize,
}

impl ShiftBuffer {
    pub fn new(frame_size: usize, slots: usize) -> Self {
        Self {
            data: vec![0.0; frame_size * slots],
            frame_size,
        }
    }

    pub fn shift(&mut self) {
        if self.data.is_empty() {
            return;
        }
        self.data.rotate_left(self.frame_size);
        let tail = self.data.len() - self.frame_size;
        self.data[tail..].fill(0.0);
    }

    pub fn push(&mut self, frame: &[f32]) {
        self.shift();
        let tail = self.data.len() - self.frame_size;
        self.data[tail..].copy_from_slice(frame);
    }

    pub fn window(&self, start: usize, len: usize) -> &[f32] {
        &self.data[start..start + len]
    }

    pub fn accumulate(&mut self, start: usize, contribution: &[f32]) {
        self.data[start..start + contribution.len()]
            .iter_mut()
            .zip(contribution)
            .for_each(|(acc, &x)| *acc += x);
    }

    pub fn head(&self) -> &[f32] {
        &self.data[..self.frame_size]
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }
}
