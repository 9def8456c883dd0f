pub mod pvgis_service;
pub mod response_cache;
pub mod simulation_service;
