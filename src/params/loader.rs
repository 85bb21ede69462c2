//! Load parameter records from JSON payloads

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::SimulationParameters;
use crate::error::EngineResult;

/// Load and validate a single parameter record from a JSON file
pub fn load_parameters<P: AsRef<Path>>(path: P) -> EngineResult<SimulationParameters> {
    let file = File::open(path)?;
    load_parameters_from_reader(BufReader::new(file))
}

/// Load and validate a single parameter record from any reader
pub fn load_parameters_from_reader<R: Read>(reader: R) -> EngineResult<SimulationParameters> {
    let params: SimulationParameters = serde_json::from_reader(reader)?;
    params.validate()?;
    Ok(params)
}

/// Load a batch of parameter records (a JSON array)
///
/// Records are not validated here: in a batch each run fails on its own.
pub fn load_parameter_batch<P: AsRef<Path>>(path: P) -> EngineResult<Vec<SimulationParameters>> {
    let file = File::open(path)?;
    let batch: Vec<SimulationParameters> = serde_json::from_reader(BufReader::new(file))?;
    Ok(batch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::params::fixtures::boundary_params;

    #[test]
    fn test_load_from_reader_validates() {
        let mut params = boundary_params();
        params.holiday_exit_fraction = 0.1;
        let json = serde_json::to_string(&params).unwrap();

        let result = load_parameters_from_reader(json.as_bytes());
        assert!(matches!(result, Err(EngineError::InvalidParameter { .. })));
    }

    #[test]
    fn test_load_from_reader_roundtrip() {
        let json = serde_json::to_string(&boundary_params()).unwrap();
        let params = load_parameters_from_reader(json.as_bytes()).unwrap();
        assert_eq!(params, boundary_params());
    }

    #[test]
    fn test_malformed_json_is_error() {
        let result = load_parameters_from_reader("{ \"house_value\": ".as_bytes());
        assert!(matches!(result, Err(EngineError::Json(_))));
    }
}
