use glam::{uvec2, UVec2};

/// Renderer state shared between the host and the per-iteration constants
/// block. Every setter except the iteration counters marks the state dirty;
/// the dispatch controller resets accumulation when it observes the flag.
#[derive(Clone, Copy, Debug)]
pub struct State {
    dirty: bool,
    resolution: UVec2,
    depth: u32,
    flip_y: bool,
    inverted_gamma: f32,
    iterations: u32,
    ray_cast_epsilon: f32,
    current_iteration: f32,
}

impl Default for State {
    fn default() -> Self {
        Self {
            dirty: true,
            resolution: uvec2(500, 500),
            depth: 10,
            flip_y: false,
            inverted_gamma: 1.0,
            iterations: 1,
            ray_cast_epsilon: 0.001,
            current_iteration: 0.0,
        }
    }
}

impl State {
    pub fn set_flip_y(&mut self, flip_y: bool) {
        self.flip_y = flip_y;
        self.set_dirty(true);
    }

    pub fn flip_y(&self) -> bool { self.flip_y }

    pub fn set_gamma(&mut self, gamma: f32) {
        self.inverted_gamma = 1.0 / gamma;
        self.set_dirty(true);
    }

    pub fn gamma(&self) -> f32 { 1.0 / self.inverted_gamma }

    pub fn inverted_gamma(&self) -> f32 { self.inverted_gamma }

    pub fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
        self.set_dirty(true);
    }

    pub fn depth(&self) -> u32 { self.depth }

    pub fn set_iterations(&mut self, iterations: u32) {
        self.iterations = iterations;
        self.set_dirty(true);
    }

    pub fn iterations(&self) -> u32 { self.iterations }

    pub fn set_resolution(&mut self, resolution: UVec2) {
        self.resolution = resolution;
        self.set_dirty(true);
    }

    pub fn resolution(&self) -> UVec2 { self.resolution }

    pub fn set_ray_cast_epsilon(&mut self, ray_cast_epsilon: f32) {
        self.ray_cast_epsilon = ray_cast_epsilon;
        self.set_dirty(true);
    }

    pub fn ray_cast_epsilon(&self) -> f32 { self.ray_cast_epsilon }

    pub fn next_iteration(&mut self) { self.current_iteration += 1.0; }

    pub fn reset_iterations(&mut self) { self.current_iteration = 0.0; }

    pub fn current_iteration(&self) -> f32 { self.current_iteration }

    pub fn set_dirty(&mut self, dirty: bool) { self.dirty = dirty; }

    pub fn is_dirty(&self) -> bool { self.dirty }
}
