mod classification;
mod common;
mod lifecycle;
