pub mod employee_records;
pub mod income_import;
pub mod intake_tokens;
pub mod issue_numbers;
pub mod lenient;
pub mod receipts;
pub mod settlement;
pub mod site_jobs;
pub mod villa_codes;
