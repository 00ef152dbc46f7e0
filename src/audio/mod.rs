pub mod analyser;
pub mod beat;
pub mod capture;
pub mod decode;
pub mod features;
