pub mod bins;
