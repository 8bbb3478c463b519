use survey::SurveyConfig;

use super::print_json;
use crate::error::Result;

pub fn run(config: &SurveyConfig) -> Result<()> {
	print_json(config)
}
