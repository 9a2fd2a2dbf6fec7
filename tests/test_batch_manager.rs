use std::fs;
use std::path::PathBuf;

use vnf_cg_scheduler::batch::BatchManager;
use vnf_cg_scheduler::config::{BatchPolicy, CgConfig};
use vnf_cg_scheduler::domain::id::{MachineId, NetworkId, ServiceId};
use vnf_cg_scheduler::domain::network::{Network, VnfType};
use vnf_cg_scheduler::domain::service::Service;
use vnf_cg_scheduler::report::{append_result, write_batch_table};
use vnf_cg_scheduler::schedule_from_files;
use vnf_cg_scheduler::solver::ScipSolver;

const NETWORK_JSON: &str = r#"{
    "id": 3,
    "machineCount": 2,
    "links": [ { "source": 0, "destination": 1, "capacity": 4 } ],
    "vnfs": [ { "host": 0, "vnfType": 0 }, { "host": 1, "vnfType": 1 } ]
}"#;

const SERVICES_JSON: &str = r#"{
    "id": 5,
    "services": [
        { "id": 0, "bandwidth": 2, "arrival": 0, "chain": [ { "vnfType": 0, "processingTime": 1 }, { "vnfType": 1, "processingTime": 1 } ] },
        { "id": 1, "bandwidth": 2, "arrival": 1, "deadline": 4, "chain": [ { "vnfType": 0, "processingTime": 2 } ] },
        { "id": 2, "bandwidth": 2, "arrival": 6, "chain": [ { "vnfType": 1, "processingTime": 2 } ] }
    ]
}"#;

const CONFIG_JSON: &str = r#"{ "horizon": 6, "batchPolicy": { "kind": "timeWindow", "slots": 4 } }"#;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("vnf_cg_scheduler_{}_{}", name, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_schedule_from_files_writes_report() {
    let dir = scratch_dir("files");
    let network_path = dir.join("network.json");
    let services_path = dir.join("services.json");
    let config_path = dir.join("config.json");
    fs::write(&network_path, NETWORK_JSON).unwrap();
    fs::write(&services_path, SERVICES_JSON).unwrap();
    fs::write(&config_path, CONFIG_JSON).unwrap();

    let output = schedule_from_files(network_path.to_str().unwrap(), services_path.to_str().unwrap(), config_path.to_str()).unwrap();

    assert_eq!(output.summary.batches.len(), 2);
    assert_eq!(output.summary.admitted, 3);
    assert_eq!(output.result.network_id, 3);
    assert_eq!(output.result.service_set_id, 5);
    assert_eq!(output.result.admission_rate, 1.0);
    assert!(output.services.iter().all(Service::is_admitted));
    // Second batch is planned from slot 4 on.
    assert!(output.services[2].middleboxes()[0].start_slot.unwrap() >= 6);

    let report_path = dir.join("results.csv");
    let _ = fs::remove_file(&report_path);
    append_result(&report_path, &output.result).unwrap();
    append_result(&report_path, &output.result).unwrap();
    let text = fs::read_to_string(&report_path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("NetworkId;ServiceSetId;VnfCount;LinkCapacity;ServiceCount;BatchPolicy;BatchSize"));
    assert!(lines[1].starts_with("3;5;2;4;3;timeWindow;4;"));

    let batch_path = dir.join("batches.csv");
    write_batch_table(&batch_path, &output.summary.batches).unwrap();
    assert_eq!(fs::read_to_string(&batch_path).unwrap().lines().count(), 3);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_file_is_reported() {
    let dir = scratch_dir("missing");
    let result = schedule_from_files(dir.join("nope.json").to_str().unwrap(), "also-missing.json", None);
    assert!(matches!(result, Err(vnf_cg_scheduler::error::Error::IoError(_))));
    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn test_later_batches_see_committed_load() {
    let mut network = Network::new(NetworkId::new(0), 1, false);
    network.add_vnf(MachineId::new(0), VnfType(0)).unwrap();
    let config = CgConfig { horizon: 4, batch_policy: BatchPolicy::FixedSize { services: 1 }, ..CgConfig::default() };
    let mut manager = BatchManager::new(network, config, ScipSolver);

    let mut services: Vec<Service> = (0..3).map(|s| Service::new(ServiceId::new(s), &[(VnfType(0), 2)], 1)).collect();
    let summary = manager.run(&mut services).unwrap();

    // Two services fill the horizon [0, 4), the third finds no free slot.
    assert_eq!(summary.admitted, 2);
    assert!(!services[2].is_admitted());
    assert_eq!(summary.batches[2].admitted, Vec::<ServiceId>::new());
    assert_eq!(summary.batches[2].excluded, vec![ServiceId::new(2)]);
    assert!((summary.admission_rate() - 2.0 / 3.0).abs() < 1e-12);
}
