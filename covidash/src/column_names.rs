//! This module stores the column names of the tables exposed by the data source and of the wide
//! tables produced by the pipeline. Note that these must be kept in sync with the schema of the
//! upstream store!

// Date dimension
pub const ID_DATE: &str = "ID_Date";
pub const DIM_DATE: &str = "Date";

// Country dimension
pub const ID_COUNTRY: &str = "ID_Country";
pub const ISO_CODE: &str = "iso_code";
pub const LOCATION: &str = "location";

// Wide table index
pub const DATE: &str = "date";

// Deaths facts
pub const NEW_DEATHS: &str = "new_deaths";
pub const NEW_DEATHS_PER_MILLION: &str = "new_deaths_per_million";
pub const TOTAL_DEATHS: &str = "total_deaths";
pub const TOTAL_DEATHS_PER_MILLION: &str = "total_deaths_per_million";

// Cases facts
pub const NEW_CASES: &str = "new_cases";
pub const NEW_CASES_PER_MILLION: &str = "new_cases_per_million";
pub const TOTAL_CASES: &str = "total_cases";
pub const TOTAL_CASES_PER_MILLION: &str = "total_cases_per_million";

// Tests facts
pub const NEW_TESTS: &str = "new_tests";
pub const NEW_TESTS_PER_THOUSAND: &str = "new_tests_per_thousand";
pub const TOTAL_TESTS: &str = "total_tests";
pub const TOTAL_TESTS_PER_THOUSAND: &str = "total_tests_per_thousand";

// Examples of country attributes
pub const POPULATION_DENSITY: &str = "population_density";
pub const HOSPITAL_BEDS_PER_THOUSAND: &str = "hospital_beds_per_thousand";
