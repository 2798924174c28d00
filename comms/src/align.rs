// Receive buffers are made of 8 byte words so that a frame body starting
// right after the 8 byte message header can be viewed as `[f64]` in place.
pub trait Align8: bytemuck::Pod {}

impl Align8 for u64 {}
impl Align8 for i64 {}
impl Align8 for f64 {}
