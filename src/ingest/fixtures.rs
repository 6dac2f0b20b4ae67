//! Test fixtures: representative CSV extracts for each category.
//!
//! These mirror the published district extracts: a `date` column in
//! day-month-year form, `state`, `district`, `pincode`, then the
//! category's age buckets. Headers carry the stray casing and padding seen
//! in real downloads so the normalizer is exercised.
//!
//! District extract shape:
//!   date        — DD-MM-YYYY, occasionally blank or garbled
//!   state       — free text, inconsistent case and whitespace
//!   district    — free text, inconsistent case and whitespace
//!   pincode     — ignored by the pipeline
//!   <buckets>   — counts; may be blank or non-numeric

/// Two districts in Maharashtra across two months, plus one row with a
/// garbled date and one with a non-numeric count.
#[cfg(test)]
pub(crate) fn fixture_enrolment_csv() -> &'static str {
    "Date, State ,DISTRICT,pincode,age_0_5,age_5_17,age_18_greater
01-03-2025,Maharashtra,Pune,411001,10,20,5
01-03-2025,Maharashtra,Nashik,422001,4,8,1
01-04-2025,maharashtra, pune ,411002,6,12,3
01-04-2025,Maharashtra,Nashik,422002,n/a,2,1
2025/04/15,Maharashtra,Pune,411003,1,1,1
"
}

/// Biometric updates for the same districts, one of them only in April.
#[cfg(test)]
pub(crate) fn fixture_biometric_csv() -> &'static str {
    "date,state,district,pincode,bio_age_5_17,bio_age_17_
01-03-2025,Maharashtra,Pune,411001,3,2
01-04-2025,Maharashtra,Pune,411001,4,4
01-04-2025,Maharashtra,Nashik,422001,1,
"
}

/// Demographic updates, including a district absent from enrolment.
#[cfg(test)]
pub(crate) fn fixture_demographic_csv() -> &'static str {
    "date,state,district,pincode,demo_age_5_17,demo_age_17_
01-03-2025,Maharashtra,Pune,411001,0,6
01-04-2025,Maharashtra,Pune,411001,2,10
01-04-2025,Karnataka,Mysuru,570001,1,3
"
}

/// A file with no `district` column at all.
#[cfg(test)]
pub(crate) fn fixture_missing_district_csv() -> &'static str {
    "date,state,pincode,age_0_5,age_5_17,age_18_greater
01-03-2025,Maharashtra,411001,10,20,5
"
}

/// A file lacking every bucket column; its rows still count with zeros.
#[cfg(test)]
pub(crate) fn fixture_enrolment_without_buckets_csv() -> &'static str {
    "date,state,district,pincode
01-03-2025,Goa,North Goa,403001
"
}
