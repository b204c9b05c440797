pub mod decision;
pub mod normalize;
pub mod risk;
pub mod signal_parser;
pub mod symbols;
