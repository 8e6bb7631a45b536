use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::Event;

/// Written once at the start of every log file.
const MAGIC: &[u8; 4] = b"FLT1";

/// Encode a single event as `[u32 len][bincode][u32 crc32]`.
fn encode_event(writer: &mut impl Write, event: &Event) -> io::Result<()> {
    let payload =
        bincode::serialize(event).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "event too large"))?;
    let crc = crc32fast::hash(&payload);
    writer.write_all(&len.to_le_bytes())?;
    writer.write_all(&payload)?;
    writer.write_all(&crc.to_le_bytes())?;
    Ok(())
}

/// Read exactly `buf.len()` bytes. `Ok(false)` on a clean or torn EOF.
fn read_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<bool> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Open for append, writing the magic header if the file is new.
fn open_for_append(path: &Path) -> io::Result<BufWriter<File>> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    if writer.get_ref().metadata()?.len() == 0 {
        writer.write_all(MAGIC)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
    }
    Ok(writer)
}

/// Append-only event log backing the booking and vehicle stores.
///
/// A torn or corrupt tail (crash mid-write) is dropped on replay; everything
/// before it is kept.
pub struct Wal {
    writer: BufWriter<File>,
    path: PathBuf,
    appends_since_compact: u64,
}

impl Wal {
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self {
            writer: open_for_append(path)?,
            path: path.to_path_buf(),
            appends_since_compact: 0,
        })
    }

    /// Append and fsync one event. Production code goes through
    /// `append_buffered` + `flush_sync` for group commit.
    #[cfg(test)]
    pub fn append(&mut self, event: &Event) -> io::Result<()> {
        self.append_buffered(event)?;
        self.flush_sync()
    }

    pub fn append_buffered(&mut self, event: &Event) -> io::Result<()> {
        encode_event(&mut self.writer, event)?;
        self.appends_since_compact += 1;
        Ok(())
    }

    pub fn flush_sync(&mut self) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write a snapshot to `<path>.tmp` and fsync it.
    pub fn write_compact_file(path: &Path, events: &[Event]) -> io::Result<()> {
        let tmp_path = path.with_extension("wal.tmp");
        let mut writer = BufWriter::new(File::create(&tmp_path)?);
        writer.write_all(MAGIC)?;
        for event in events {
            encode_event(&mut writer, event)?;
        }
        writer.flush()?;
        writer.get_ref().sync_all()
    }

    /// Rename the snapshot over the log and reopen for append.
    pub fn swap_compact_file(&mut self) -> io::Result<()> {
        let tmp_path = self.path.with_extension("wal.tmp");
        fs::rename(&tmp_path, &self.path)?;
        self.writer = open_for_append(&self.path)?;
        self.appends_since_compact = 0;
        Ok(())
    }

    #[cfg(test)]
    pub fn compact(&mut self, events: &[Event]) -> io::Result<()> {
        Self::write_compact_file(&self.path, events)?;
        self.swap_compact_file()
    }

    pub fn appends_since_compact(&self) -> u64 {
        self.appends_since_compact
    }

    /// Replay every intact event. A missing file is an empty log; a file
    /// without the header is refused rather than misread.
    pub fn replay(path: &Path) -> io::Result<Vec<Event>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        if !read_or_eof(&mut reader, &mut magic)? {
            return Ok(Vec::new());
        }
        if &magic != MAGIC {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a fleetd log", path.display()),
            ));
        }

        let mut events = Vec::new();
        loop {
            let mut len_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut len_buf)? {
                break;
            }
            let mut payload = vec![0u8; u32::from_le_bytes(len_buf) as usize];
            if !read_or_eof(&mut reader, &mut payload)? {
                break;
            }
            let mut crc_buf = [0u8; 4];
            if !read_or_eof(&mut reader, &mut crc_buf)? {
                break;
            }
            if u32::from_le_bytes(crc_buf) != crc32fast::hash(&payload) {
                tracing::warn!("{}: checksum mismatch after {} events, truncating replay", path.display(), events.len());
                break;
            }
            match bincode::deserialize::<Event>(&payload) {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }

        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use rust_decimal::Decimal;
    use ulid::Ulid;

    fn tmp_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("fleetd_test_wal");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = fs::remove_file(&path);
        path
    }

    fn vehicle() -> Vehicle {
        Vehicle {
            id: Ulid::new(),
            owner_id: Ulid::new(),
            location: "NYC".into(),
            price_per_day: Decimal::new(4999, 2),
            available: true,
            brand: "BMW".into(),
            model: "X5".into(),
            year: Some(2022),
            category: Some("SUV".into()),
            transmission: Some("Automatic".into()),
            fuel_type: Some("Diesel".into()),
            seating_capacity: Some(5),
            description: None,
            image: Some("https://img.example/x5.webp".into()),
            created_at: 1_700_000_000_000,
        }
    }

    fn booking_for(v: &Vehicle) -> Booking {
        Booking {
            id: Ulid::new(),
            vehicle_id: v.id,
            owner_id: v.owner_id,
            renter_id: Ulid::new(),
            range: DateRange::new(1_709_251_200_000, 1_709_424_000_000),
            price: Decimal::new(9998, 2),
            status: BookingStatus::Pending,
            created_at: 1_700_000_000_001,
        }
    }

    #[test]
    fn append_and_replay_preserves_decimals() {
        let path = tmp_path("append_and_replay.wal");
        let v = vehicle();
        let b = booking_for(&v);
        let events = vec![
            Event::VehicleListed { vehicle: v.clone() },
            Event::BookingCreated { booking: b.clone() },
            Event::BookingStatusChanged {
                id: b.id,
                vehicle_id: v.id,
                owner_id: v.owner_id,
                renter_id: b.renter_id,
                status: BookingStatus::Confirmed,
            },
        ];
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append(e).unwrap();
            }
        }

        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, events);
        match &replayed[1] {
            Event::BookingCreated { booking } => assert_eq!(booking.price, Decimal::new(9998, 2)),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn replay_drops_torn_tail() {
        let path = tmp_path("torn.wal");
        let event = Event::VehicleListed { vehicle: vehicle() };
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&event).unwrap();
        }
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(&[9u8, 0, 0, 0, 1, 2]).unwrap();
        }
        let replayed = Wal::replay(&path).unwrap();
        assert_eq!(replayed, vec![event]);
    }

    #[test]
    fn replay_missing_file_is_empty() {
        let path = tmp_path("missing.wal");
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn replay_stops_at_bad_checksum() {
        let path = tmp_path("bad_crc.wal");
        let event = Event::ResetCodeRedeemed {
            code: "123456".into(),
            user_id: Ulid::new(),
        };
        {
            let payload = bincode::serialize(&event).unwrap();
            let mut f = File::create(&path).unwrap();
            f.write_all(MAGIC).unwrap();
            f.write_all(&(payload.len() as u32).to_le_bytes()).unwrap();
            f.write_all(&payload).unwrap();
            f.write_all(&0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        }
        assert!(Wal::replay(&path).unwrap().is_empty());
    }

    #[test]
    fn foreign_file_is_refused() {
        let path = tmp_path("foreign.wal");
        fs::write(&path, b"not a log at all").unwrap();
        let err = Wal::replay(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn compact_shrinks_and_accepts_appends() {
        let path = tmp_path("compact.wal");
        let v = vehicle();
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.append(&Event::VehicleListed { vehicle: v.clone() }).unwrap();
            for available in [false, true, false, true, false, true] {
                wal.append(&Event::VehicleAvailabilitySet {
                    id: v.id,
                    owner_id: v.owner_id,
                    available,
                })
                .unwrap();
            }
        }
        let before = fs::metadata(&path).unwrap().len();

        let snapshot = vec![Event::VehicleListed { vehicle: v.clone() }];
        let extra = Event::VehicleRemoved {
            id: v.id,
            owner_id: v.owner_id,
        };
        {
            let mut wal = Wal::open(&path).unwrap();
            wal.compact(&snapshot).unwrap();
            assert_eq!(wal.appends_since_compact(), 0);
            wal.append(&extra).unwrap();
        }

        let after = fs::metadata(&path).unwrap().len();
        assert!(after < before, "compacted log should be smaller: {after} < {before}");
        assert_eq!(Wal::replay(&path).unwrap(), vec![snapshot[0].clone(), extra]);
    }

    #[test]
    fn buffered_appends_count_until_flush() {
        let path = tmp_path("buffered.wal");
        let events: Vec<Event> = (0..4)
            .map(|_| Event::VehicleListed { vehicle: vehicle() })
            .collect();
        {
            let mut wal = Wal::open(&path).unwrap();
            for e in &events {
                wal.append_buffered(e).unwrap();
            }
            assert_eq!(wal.appends_since_compact(), 4);
            wal.flush_sync().unwrap();
        }
        assert_eq!(Wal::replay(&path).unwrap(), events);
    }
}
