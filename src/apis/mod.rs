// HTTP data providers

pub mod coingecko;
pub mod open_meteo;
