//! Cross-module properties over the log file format: footer reconstruction
//! and indexed/sequential query equivalence.

use std::io::Cursor;

use btelem_core::{LogReader, LogWriter};
use btelem_proto::{build_packet, BtelemType, Endian, FieldDef, PacketHeaderVersion, Schema, SchemaEntry};
use proptest::prelude::*;

fn sensor_schema() -> Schema {
    let value = FieldDef::new("value", 0, 4, BtelemType::F32, 1);
    let entry = SchemaEntry::new(7, "sensor", 4, vec![value]);
    Schema::new(vec![entry], Endian::Little)
}

fn write_log(packets: &[Vec<(u16, u64, Vec<u8>)>]) -> Vec<u8> {
    let schema = sensor_schema();
    let mut buf = Vec::new();
    let mut writer = LogWriter::create(&mut buf, &schema).expect("create");
    for entries in packets {
        let pkt = build_packet(entries, PacketHeaderVersion::V1);
        writer.write_packet(&pkt).expect("write");
    }
    writer.close().expect("close");
    buf
}

#[test]
fn footer_index_matches_packets_written() {
    let packets = vec![
        vec![(7, 100, 1.0f32.to_le_bytes().to_vec()), (7, 200, 2.0f32.to_le_bytes().to_vec())],
        vec![(7, 300, 3.0f32.to_le_bytes().to_vec())],
        vec![(7, 50, 4.0f32.to_le_bytes().to_vec()), (7, 900, 5.0f32.to_le_bytes().to_vec())],
    ];
    let buf = write_log(&packets);
    let reader = LogReader::open(Cursor::new(buf), PacketHeaderVersion::V1).expect("open");
    let index = reader.index().expect("footer index present").to_vec();

    assert_eq!(index.len(), packets.len());
    for (ie, entries) in index.iter().zip(packets.iter()) {
        let timestamps: Vec<u64> = entries.iter().map(|(_, ts, _)| *ts).collect();
        assert_eq!(ie.ts_min, *timestamps.iter().min().unwrap());
        assert_eq!(ie.ts_max, *timestamps.iter().max().unwrap());
        assert_eq!(ie.entry_count as usize, entries.len());
    }
}

proptest! {
    #[test]
    fn indexed_query_matches_unfiltered_scan_restricted_by_time(
        timestamps in prop::collection::vec(0u64..100_000, 1..40),
        lo in 0u64..100_000,
        span in 0u64..20_000,
    ) {
        let packets: Vec<Vec<(u16, u64, Vec<u8>)>> = timestamps
            .chunks(3)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|ts| (7u16, *ts, (*ts as f32).to_le_bytes().to_vec()))
                    .collect()
            })
            .collect();
        let buf = write_log(&packets);
        let hi = lo.saturating_add(span);

        let mut reader = LogReader::open(Cursor::new(buf), PacketHeaderVersion::V1).expect("open");
        let indexed = reader.entries(Some(lo), Some(hi), None).expect("indexed query");
        let all = reader.entries(None, None, None).expect("full scan");
        let mut expected: Vec<u64> = all
            .into_iter()
            .map(|e| e.timestamp)
            .filter(|ts| *ts >= lo && *ts <= hi)
            .collect();
        let mut actual: Vec<u64> = indexed.into_iter().map(|e| e.timestamp).collect();

        expected.sort_unstable();
        actual.sort_unstable();
        prop_assert_eq!(actual, expected);
    }
}
