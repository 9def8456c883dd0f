pub mod pvgis;
pub mod simulation;
