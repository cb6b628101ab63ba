//! 3-D Vectors

#![allow(dead_code)]
use crate::math::*;
use num_traits::{Num, Zero};
use std::ops::{
    Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign,
};

/// A 3-D vector containing numeric values.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Vector3<T> {
    /// X-coordinate.
    pub x: T,

    /// Y-coordinate.
    pub y: T,

    /// Z-coordinate.
    pub z: T,
}

/// 3-D vector containing `Float` values.
pub type Vector3f = Vector3<Float>;

/// Points share their representation with vectors.
pub type Point3f = Vector3f;

/// Normals share their representation with vectors.
pub type Normal3f = Vector3f;

impl<T: Num> Vector3<T> {
    /// Creates a new 3-D vector.
    ///
    /// * `x` - X-coordinate.
    /// * `y` - Y-coordinate.
    /// * `z` - Z-coordinate.
    pub const fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }

    /// Creates a new 3-D zero vector.
    pub fn zero() -> Self
    where
        T: Zero,
    {
        Self::new(T::zero(), T::zero(), T::zero())
    }

    /// Returns true if all components are zero.
    pub fn is_zero(&self) -> bool
    where
        T: Zero,
    {
        self.x.is_zero() && self.y.is_zero() && self.z.is_zero()
    }

    /// Returns true if either coordinate is NaN.
    pub fn has_nans(&self) -> bool
    where
        T: num_traits::Float,
    {
        self.x.is_nan() || self.y.is_nan() || self.z.is_nan()
    }

    /// Returns true if all coordinates are finite.
    pub fn is_finite(&self) -> bool
    where
        T: num_traits::Float,
    {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Returns the square of the vector's length.
    pub fn length_squared(&self) -> T
    where
        T: Mul<Output = T> + Add<Output = T> + Copy,
    {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Returns the vector's length.
    pub fn length(&self) -> T
    where
        T: num_traits::Float,
    {
        self.length_squared().sqrt()
    }

    /// Returns the unit vector.
    pub fn normalize(&self) -> Self
    where
        T: num_traits::Float,
    {
        *self / self.length()
    }

    /// Returns the unit vector or zero if the vector has no length.
    pub fn safe_normalize(&self) -> Self
    where
        T: num_traits::Float,
    {
        let len = self.length();
        if len > T::zero() {
            *self / len
        } else {
            Self::zero()
        }
    }

    /// Returns a new vector containing absolute values of the components.
    pub fn abs(&self) -> Self
    where
        T: num_traits::Float,
    {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    /// Returns the dot product with another vector.
    ///
    /// * `other` - The other vector.
    pub fn dot(&self, other: &Self) -> T
    where
        T: Copy,
    {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    /// Returns the cross product with another vector.
    ///
    /// * `other` - The other vector.
    pub fn cross(&self, other: &Self) -> Self
    where
        T: Copy,
    {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }
}

impl Vector3f {
    /// Returns the average of the components.
    pub fn average(&self) -> Float {
        (self.x + self.y + self.z) / 3.0
    }

    /// Flip this vector so it lies in the same hemisphere as `v`.
    ///
    /// * `v` - Reference vector.
    pub fn face_forward(&self, v: &Self) -> Self {
        if self.dot(v) < 0.0 {
            -*self
        } else {
            *self
        }
    }

    /// Construct an orthonormal basis `(t, b)` around this unit vector.
    pub fn make_orthonormals(&self) -> (Self, Self) {
        let a = if self.x != self.y || self.x != self.z {
            // (1,1,1) x N
            Self::new(self.z - self.y, self.x - self.z, self.y - self.x)
        } else {
            // (-1,1,1) x N
            Self::new(self.z - self.y, self.x + self.z, -self.y - self.x)
        };
        let a = a.normalize();
        let b = self.cross(&a);
        (a, b)
    }

    /// Reflect this vector about a normal: `-self + 2 (self·n) n`.
    ///
    /// * `n` - The normal.
    pub fn reflect(&self, n: &Self) -> Self {
        *n * (2.0 * self.dot(n)) - *self
    }
}

impl<T> Add for Vector3<T>
where
    T: Num,
{
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl<T> AddAssign for Vector3<T>
where
    T: AddAssign,
{
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
        self.z += other.z;
    }
}

impl<T> Sub for Vector3<T>
where
    T: Num,
{
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl<T> SubAssign for Vector3<T>
where
    T: SubAssign,
{
    fn sub_assign(&mut self, other: Self) {
        self.x -= other.x;
        self.y -= other.y;
        self.z -= other.z;
    }
}

impl<T> Mul<T> for Vector3<T>
where
    T: Num + Copy,
{
    type Output = Self;

    fn mul(self, f: T) -> Self::Output {
        Self::new(f * self.x, f * self.y, f * self.z)
    }
}

impl<T> MulAssign<T> for Vector3<T>
where
    T: MulAssign + Copy,
{
    fn mul_assign(&mut self, f: T) {
        self.x *= f;
        self.y *= f;
        self.z *= f;
    }
}

impl Mul<Vector3<Float>> for Float {
    type Output = Vector3<Float>;

    fn mul(self, v: Vector3<Float>) -> Self::Output {
        v * self
    }
}

impl<T> Div<T> for Vector3<T>
where
    T: Num + Copy,
{
    type Output = Self;

    fn div(self, f: T) -> Self::Output {
        let inv = T::one() / f;
        Self::new(self.x * inv, self.y * inv, self.z * inv)
    }
}

impl<T> DivAssign<T> for Vector3<T>
where
    T: Num + MulAssign + Copy,
{
    fn div_assign(&mut self, f: T) {
        let inv = T::one() / f;
        self.x *= inv;
        self.y *= inv;
        self.z *= inv;
    }
}

impl<T> Neg for Vector3<T>
where
    T: Num + Neg<Output = T>,
{
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl<T> Index<usize> for Vector3<T> {
    type Output = T;

    fn index(&self, i: usize) -> &Self::Output {
        match i {
            0 => &self.x,
            1 => &self.y,
            _ => &self.z,
        }
    }
}

impl<T> IndexMut<usize> for Vector3<T> {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            _ => &mut self.z,
        }
    }
}

impl<T> From<[T; 3]> for Vector3<T> {
    fn from(a: [T; 3]) -> Self {
        let [x, y, z] = a;
        Self { x, y, z }
    }
}

impl<T: std::fmt::Display> std::fmt::Display for Vector3<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}
