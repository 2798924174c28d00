use std::{io, ops::AddAssign};

/// The four running sums a least-squares fit needs.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PartialSums {
    pub sum_x: f64,
    pub sum_y: f64,
    pub sum_xy: f64,
    pub sum_xx: f64,
}

impl PartialSums {
    pub const LEN: usize = 4;

    /// Sums the paired columns in index order.
    ///
    /// # Arguments
    /// * `x` - The x values.
    /// * `y` - The y values, paired with `x` by index.
    ///
    /// # Returns
    /// The partial sums, zero for empty columns.
    pub fn accumulate(x: &[f64], y: &[f64]) -> Self {
        debug_assert_eq!(x.len(), y.len());

        let mut sums = Self::default();
        for (&xv, &yv) in x.iter().zip(y) {
            sums.sum_x += xv;
            sums.sum_y += yv;
            sums.sum_xy += xv * yv;
            sums.sum_xx += xv * xv;
        }

        sums
    }

    /// The wire layout: `[Σx, Σy, Σxy, Σx²]`.
    pub fn to_array(self) -> [f64; Self::LEN] {
        [self.sum_x, self.sum_y, self.sum_xy, self.sum_xx]
    }

    pub fn from_array([sum_x, sum_y, sum_xy, sum_xx]: [f64; Self::LEN]) -> Self {
        Self {
            sum_x,
            sum_y,
            sum_xy,
            sum_xx,
        }
    }
}

impl AddAssign for PartialSums {
    fn add_assign(&mut self, rhs: Self) {
        self.sum_x += rhs.sum_x;
        self.sum_y += rhs.sum_y;
        self.sum_xy += rhs.sum_xy;
        self.sum_xx += rhs.sum_xx;
    }
}

impl TryFrom<&[f64]> for PartialSums {
    type Error = io::Error;

    fn try_from(values: &[f64]) -> io::Result<Self> {
        let array = <[f64; Self::LEN]>::try_from(values).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("expected {} partial sums, got {}", Self::LEN, values.len()),
            )
        })?;

        Ok(Self::from_array(array))
    }
}
