//! Reformat multi-block molecular coordinate files, where each block is an atom count, a line of
//! bare metadata values, and the atom lines, into extended XYZ with labeled header values. Then
//! load the result back as frames of atoms.

pub mod directory;
pub mod extxyz;
pub mod layout;
pub mod reformat;

use lin_alg::f64::Vec3;
use na_seq::Element;

pub use directory::*;
pub use extxyz::{ExtXyz, Frame, load_folder};
pub use layout::HeaderLayout;
pub use reformat::*;

#[derive(Clone, Debug)]
pub struct AtomGeneric {
    pub serial_number: usize,
    pub posit: Vec3,
    pub element: Element,
}
