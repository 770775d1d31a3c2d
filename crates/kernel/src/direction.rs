//! Spatial axes, typed face directions, and velocity-space sweep orders.

/// Cartesian axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum Axis {
    /// x axis
    X = 0,
    /// y axis
    Y = 1,
    /// z axis
    Z = 2,
}

impl Axis {
    /// All three axes in index order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Component index (0, 1, 2) of this axis in `[f64; 3]` vectors.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Face direction pointing along `+self`.
    pub fn positive(self) -> FaceDirection {
        match self {
            Axis::X => FaceDirection::PosX,
            Axis::Y => FaceDirection::PosY,
            Axis::Z => FaceDirection::PosZ,
        }
    }

    /// Face direction pointing along `-self`.
    pub fn negative(self) -> FaceDirection {
        match self {
            Axis::X => FaceDirection::NegX,
            Axis::Y => FaceDirection::NegY,
            Axis::Z => FaceDirection::NegZ,
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        f.write_str(name)
    }
}

/// Direction from a cell to one of its six face neighbors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FaceDirection {
    /// Neighbor across the +x face
    PosX,
    /// Neighbor across the -x face
    NegX,
    /// Neighbor across the +y face
    PosY,
    /// Neighbor across the -y face
    NegY,
    /// Neighbor across the +z face
    PosZ,
    /// Neighbor across the -z face
    NegZ,
}

impl FaceDirection {
    /// All six face directions, negative before positive per axis.
    pub const ALL: [FaceDirection; 6] = [
        FaceDirection::NegX,
        FaceDirection::PosX,
        FaceDirection::NegY,
        FaceDirection::PosY,
        FaceDirection::NegZ,
        FaceDirection::PosZ,
    ];

    /// Axis normal to the face.
    pub fn axis(self) -> Axis {
        match self {
            FaceDirection::PosX | FaceDirection::NegX => Axis::X,
            FaceDirection::PosY | FaceDirection::NegY => Axis::Y,
            FaceDirection::PosZ | FaceDirection::NegZ => Axis::Z,
        }
    }

    /// `+1` for the positive face, `-1` for the negative face.
    pub fn sign(self) -> i64 {
        match self {
            FaceDirection::PosX | FaceDirection::PosY | FaceDirection::PosZ => 1,
            FaceDirection::NegX | FaceDirection::NegY | FaceDirection::NegZ => -1,
        }
    }

    /// The face on the other side of the cell.
    pub fn opposite(self) -> FaceDirection {
        match self {
            FaceDirection::PosX => FaceDirection::NegX,
            FaceDirection::NegX => FaceDirection::PosX,
            FaceDirection::PosY => FaceDirection::NegY,
            FaceDirection::NegY => FaceDirection::PosY,
            FaceDirection::PosZ => FaceDirection::NegZ,
            FaceDirection::NegZ => FaceDirection::PosZ,
        }
    }

    /// Integer offset `[di, dj, dk]` of the neighbor in index space.
    pub fn offset(self) -> [i64; 3] {
        let mut o = [0_i64; 3];
        o[self.axis().index()] = self.sign();
        o
    }
}

// ---------------------------------------------------------------------------
// Velocity-space sweep order
// ---------------------------------------------------------------------------

/// Order in which the three velocity axes are remapped during one
/// acceleration subcycle step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisOrder {
    /// x, y, z
    Xyz,
    /// x, z, y
    Xzy,
    /// y, x, z
    Yxz,
    /// y, z, x
    Yzx,
    /// z, x, y
    Zxy,
    /// z, y, x
    Zyx,
}

impl AxisOrder {
    /// The six permutations in a fixed table order.
    pub const ALL: [AxisOrder; 6] = [
        AxisOrder::Xyz,
        AxisOrder::Xzy,
        AxisOrder::Yxz,
        AxisOrder::Yzx,
        AxisOrder::Zxy,
        AxisOrder::Zyx,
    ];

    /// Axes in sweep order.
    pub fn axes(self) -> [Axis; 3] {
        use Axis::{X, Y, Z};
        match self {
            AxisOrder::Xyz => [X, Y, Z],
            AxisOrder::Xzy => [X, Z, Y],
            AxisOrder::Yxz => [Y, X, Z],
            AxisOrder::Yzx => [Y, Z, X],
            AxisOrder::Zxy => [Z, X, Y],
            AxisOrder::Zyx => [Z, Y, X],
        }
    }
}

/// SplitMix64 finalizer. Stable across platforms and releases.
#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Velocity-axis order for the global simulation step `tstep`.
///
/// Depends only on the step counter, so every rank and every cell picks the
/// same order, and a restarted run reproduces it exactly.
pub fn velocity_axis_order(tstep: u64) -> AxisOrder {
    AxisOrder::ALL[(splitmix64(tstep) % 6) as usize]
}
