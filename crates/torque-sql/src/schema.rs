//! Fixed schema description for the dealership relational store.
//!
//! The generator only ever sees this text; it has no live schema access.
//! Keep it in sync with the migrations owned by the seeding system.

pub const SCHEMA_DESCRIPTION: &str = "\
Tables (SQLite):

vehicles(vin TEXT PRIMARY KEY, model TEXT, variant TEXT, color TEXT,
         year INTEGER, dealership_id INTEGER)
dealerships(id INTEGER PRIMARY KEY, name TEXT, city TEXT)
warranty_claims(id INTEGER PRIMARY KEY, vin TEXT, claim_type TEXT,
                description TEXT, status TEXT, claim_date TEXT,
                dealership_id INTEGER)
service_visits(id INTEGER PRIMARY KEY, vin TEXT, visit_date TEXT,
               odometer_km INTEGER, work_done TEXT, dealership_id INTEGER)

Notes:
- Dates are ISO-8601 text (YYYY-MM-DD); use strftime for month/year math.
- claim_type values include: tyre, brake, engine, transmission, electrical,
  suspension, ac, paint.
- status values: open, approved, rejected, closed.
- Join warranty_claims.vin and service_visits.vin to vehicles.vin;
  dealership_id joins to dealerships.id.";

/// DDL used by tests to seed an in-memory database matching the
/// description above.
pub const TEST_DDL: &str = "\
CREATE TABLE vehicles (
    vin TEXT PRIMARY KEY,
    model TEXT,
    variant TEXT,
    color TEXT,
    year INTEGER,
    dealership_id INTEGER
);
CREATE TABLE dealerships (
    id INTEGER PRIMARY KEY,
    name TEXT,
    city TEXT
);
CREATE TABLE warranty_claims (
    id INTEGER PRIMARY KEY,
    vin TEXT,
    claim_type TEXT,
    description TEXT,
    status TEXT,
    claim_date TEXT,
    dealership_id INTEGER
);
CREATE TABLE service_visits (
    id INTEGER PRIMARY KEY,
    vin TEXT,
    visit_date TEXT,
    odometer_km INTEGER,
    work_done TEXT,
    dealership_id INTEGER
);";
