mod backbone;
mod bauta;
mod classifiers;
mod mask_detectors;
mod mask_refiners;
mod modules;

pub use backbone::Backbone;
pub use bauta::{Bauta, BautaRecord};
pub use classifiers::Classifiers;
pub use mask_detectors::MaskDetectors;
pub use mask_refiners::MaskRefiners;
