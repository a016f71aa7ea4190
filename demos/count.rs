use clap::Parser;
use csv::{ByteRecord, ReaderBuilder};
use fastcsv::RowParserBuilder;

#[derive(Parser, Debug)]
struct Args {
    /// Path to target CSV file, possibly gzipped
    path: String,

    /// Whether to count using the `csv` crate instead
    #[arg(long)]
    csv: bool,

    /// Whether to disable SIMD acceleration
    #[arg(long)]
    scalar: bool,

    /// Maximum number of columns per row
    #[arg(long, default_value_t = 500)]
    max_columns: usize,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if args.csv {
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .from_path(&args.path)?;

        let mut count: u64 = 0;
        let mut record = ByteRecord::new();

        while reader.read_byte_record(&mut record)? {
            count += 1;
        }

        println!("{}", count);
    } else {
        let mut parser = RowParserBuilder::new()
            .scalar(args.scalar)
            .max_columns(args.max_columns)
            .from_path(&args.path)?;

        while parser.advance()? {}

        println!("{}", parser.index());
    }

    Ok(())
}
