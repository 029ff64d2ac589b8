//! Common, IO-related code.

use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use flate2::{bufread::MultiGzDecoder, write::GzEncoder, Compression};

/// Transparently open a file with gzip decoder.
pub fn open_read_maybe_gz<P>(path: P) -> Result<Box<dyn BufRead>, anyhow::Error>
where
    P: AsRef<Path>,
{
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for reading", path.as_ref());
        let file = File::open(path)?;
        let bufreader = BufReader::new(file);
        let decoder = MultiGzDecoder::new(bufreader);
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        tracing::trace!("Opening {:?} as plain text for reading", path.as_ref());
        let file = File::open(path).map(BufReader::new)?;
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Transparently open a file with gzip encoder.
pub fn open_write_maybe_gz<P>(path: P) -> Result<Box<dyn Write>, anyhow::Error>
where
    P: AsRef<Path>,
{
    if path.as_ref().extension().map(|s| s.to_str()) == Some(Some("gz")) {
        tracing::trace!("Opening {:?} as gzip for writing", path.as_ref());
        let file = File::create(path)?;
        let bufwriter = BufWriter::new(file);
        let encoder = GzEncoder::new(bufwriter, Compression::default());
        Ok(Box::new(encoder))
    } else {
        tracing::trace!("Opening {:?} as plain text for writing", path.as_ref());
        let file = File::create(path)?;
        Ok(Box::new(file))
    }
}

/// Returns an iterator over the lines of a text file.
pub fn read_lines<P: AsRef<Path>>(
    filename: P,
) -> std::io::Result<std::io::Lines<std::io::BufReader<File>>>
where
    P: AsRef<Path>,
{
    let file = File::open(filename)?;
    Ok(std::io::BufReader::new(file).lines())
}

#[cfg(test)]
mod test {
    use std::io::{Read, Write};

    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[test]
    fn open_write_maybe_gz_plain_roundtrips() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let path = dir.path().join("test.txt");
        {
            let mut f = super::open_write_maybe_gz(&path)?;
            f.write_all(b"hello")?;
            f.flush()?;
        }
        let mut f = std::fs::File::open(&path).map(std::io::BufReader::new)?;
        let mut buf = Vec::new();
        f.read_to_end(&mut buf)?;
        assert_eq!(buf, b"hello");
        Ok(())
    }

    #[test]
    fn open_write_then_read_maybe_gz_roundtrips() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let path = dir.path().join("test.txt.gz");
        {
            let mut f = super::open_write_maybe_gz(&path)?;
            f.write_all(b"hello, gzip")?;
            f.flush()?;
        }
        let mut f = super::open_read_maybe_gz(&path)?;
        let mut buf = String::new();
        f.read_to_string(&mut buf)?;
        assert_eq!(buf, "hello, gzip");
        Ok(())
    }

    #[test]
    fn read_lines_yields_each_line() -> Result<(), anyhow::Error> {
        let dir = tempdir()?;
        let path = dir.path().join("lines.txt");
        std::fs::write(&path, "one\ntwo\nthree\n")?;
        let lines = super::read_lines(&path)?.collect::<Result<Vec<_>, _>>()?;
        assert_eq!(lines, vec!["one".to_string(), "two".to_string(), "three".to_string()]);
        Ok(())
    }
}
