use std::fs::File;
use std::io::{BufReader, Read};

use bstr::BStr;
use clap::Parser;
use fastcsv::RowParserBuilder;
use flate2::read::MultiGzDecoder;

#[derive(Parser, Debug)]
struct Args {
    /// Path to target CSV file, possibly gzipped
    path: String,

    /// Whether to disable SIMD acceleration
    #[arg(long)]
    scalar: bool,

    /// Maximum length of a row, in bytes
    #[arg(long, default_value_t = 32 * (1 << 10))]
    max_row_len: usize,
}

fn open(args: &Args, is_gzip: bool) -> anyhow::Result<Box<dyn Read>> {
    let file = BufReader::new(File::open(&args.path)?);

    Ok(if is_gzip {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    })
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut parser = RowParserBuilder::new()
        .scalar(args.scalar)
        .max_row_len(args.max_row_len)
        .from_path(&args.path)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .quoting(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_reader(open(&args, parser.is_gzip())?);

    let mut record = csv::ByteRecord::new();
    let mut index: u64 = 0;

    while let Some(row) = parser.read_row()? {
        if !reader.read_byte_record(&mut record)? {
            anyhow::bail!("csv reader ended before row {}", index);
        }

        if !row.iter().eq(record.iter()) {
            anyhow::bail!(
                "row {} differs: {:?} != {:?}",
                index,
                BStr::new(row.as_raw()),
                record.iter().map(BStr::new).collect::<Vec<_>>()
            );
        }

        index += 1;
    }

    if reader.read_byte_record(&mut record)? {
        anyhow::bail!("csv reader has more rows than {}", parser.index());
    }

    println!("{} rows checked ({} bytes)", parser.index(), parser.position());

    Ok(())
}
