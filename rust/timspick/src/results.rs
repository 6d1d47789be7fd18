use std::fs::File;
use std::path::Path;

use parquet::file::writer::SerializedFileWriter;
use parquet::record::RecordWriter;
use serde::Serialize;

/// One monoisotopic precursor, flattened for the results table.
#[derive(Debug, Clone, Serialize, ParquetRecordWriter)]
pub struct MonoisotopicPrecursorRecord {
    pub cluster_id: i64,
    pub charge: i32,
    pub mz: f64,
    pub im: f32,
    pub rt: f32,
    pub summed_intensity: f64,
    pub number_of_ions: i64,
    pub apex_pointer: i64,
}

pub fn write_precursor_records<P: AsRef<Path> + Clone>(
    records: &[MonoisotopicPrecursorRecord],
    out_path: P,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let file = match File::create_new(out_path.clone()) {
        Ok(file) => file,
        Err(err) => {
            tracing::error!(
                "Failed to open file {:?} with error: {}",
                out_path.as_ref(),
                err
            );
            return Err(Box::new(err));
        }
    };
    let schema = records.schema()?;
    let mut writer = SerializedFileWriter::new(file, schema, Default::default())?;
    let mut row_group = writer.next_row_group()?;
    records.write_to_row_group(&mut row_group)?;
    row_group.close()?;
    writer.close()?;

    Ok(())
}
