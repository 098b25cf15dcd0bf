use time::{OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use super::error::SchemaError;
use super::nwb::{CovariateValue, NwbFile, Sex, Subject};
use super::records::{SubjectRecord, TrialRow};

const NO_NOTES: &str = "no notes";

const TRIAL_COLUMNS: [(&str, &str); 3] = [
    ("odorant", "the name of the odorant"),
    ("concentration", "the concentration of the odorant"),
    ("solution_date", "the date the odorant solution was made"),
];

/// Fill the subject slot of the file from a subject row
pub fn attach_subject(
    nwbfile: &mut NwbFile,
    record: &SubjectRecord,
    species: &str,
    offset: UtcOffset,
) -> Result<(), SchemaError> {
    if nwbfile.subject.is_some() {
        return Err(SchemaError::DuplicateName {
            container: String::from("general"),
            name: String::from("subject"),
        });
    }
    let date_of_birth: Option<OffsetDateTime> = record
        .dob
        .map(|dob| PrimitiveDateTime::new(dob, Time::MIDNIGHT).assume_offset(offset));
    let sex = Sex::normalize(&record.sex);
    if sex == Sex::Unknown {
        spdlog::debug!(
            "Sex {:?} of animal {} is not M/F, recording it as unknown",
            record.sex,
            record.animal_id
        );
    }
    nwbfile.subject = Some(Subject {
        subject_id: record.animal_id.to_string(),
        date_of_birth,
        sex,
        species: species.to_string(),
        description: record
            .notes
            .clone()
            .filter(|notes| !notes.trim().is_empty())
            .unwrap_or_else(|| String::from(NO_NOTES)),
    });
    Ok(())
}

/// Declare the odor trial columns and add one trial per row, in row order.
///
/// Must be called at most once per file: the columns can only be declared once.
pub fn attach_trials(nwbfile: &mut NwbFile, rows: &[TrialRow]) -> Result<(), SchemaError> {
    for (name, description) in TRIAL_COLUMNS {
        nwbfile.add_trial_column(name, description)?;
    }
    for row in rows.iter() {
        nwbfile.add_trial(
            row.trial_start_time,
            row.trial_end_time,
            vec![
                ("odorant", CovariateValue::Text(row.odorant.clone())),
                ("concentration", CovariateValue::Float(row.concentration)),
                (
                    "solution_date",
                    CovariateValue::Text(row.solution_date.to_string()),
                ),
            ],
        )?;
    }
    spdlog::info!("Added {} odor trials", rows.len());
    Ok(())
}
