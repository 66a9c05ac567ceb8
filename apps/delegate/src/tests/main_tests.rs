use super::*;

use shared::domain::{DelegateId, DirectSource, GroupingSource, ProjectId};

fn catalog() -> Vec<FundingSource> {
    vec![
        FundingSource::Grouping(GroupingSource {
            id: SourceId::new("dac-1"),
            name: "Climate".into(),
            owner_address: WalletAddress::new("0xowner"),
            delegate_id: DelegateId(7),
            delegate_entity: None,
            delegate: None,
        }),
        FundingSource::Direct(DirectSource {
            id: SourceId::new("campaign-1"),
            name: "Water".into(),
            project_id: ProjectId(3),
            owner_entity: None,
        }),
    ]
}

fn fixture(owner: Option<&str>) -> Fixture {
    let owner = owner
        .map(|o| format!("\"ownerAddress\": \"{o}\","))
        .unwrap_or_default();
    Fixture::parse(&format!(
        "{{ {owner} \"destination\": {{\"type\": \"campaign\", \"id\": \"c\", \"title\": \"C\"}} }}"
    ))
    .expect("fixture")
}

#[test]
fn source_arg_accepts_bare_and_kinded_ids() {
    let bare: SourceArg = "dac-1".parse().expect("bare");
    assert_eq!(bare.kind, None);
    assert_eq!(bare.id, SourceId::new("dac-1"));

    let kinded: SourceArg = "campaign:campaign-1".parse().expect("kinded");
    assert_eq!(kinded.kind, Some(SourceKind::Direct));
    assert_eq!(kinded.id, SourceId::new("campaign-1"));
}

#[test]
fn source_arg_rejects_unknown_kinds_and_empty_ids() {
    let err = "milestone:m-1".parse::<SourceArg>().expect_err("unsupported kind");
    assert!(err.to_string().contains("milestone"));
    assert!("dac:".parse::<SourceArg>().is_err());
}

#[test]
fn resolve_checks_presence_and_kind() {
    let sources = catalog();
    let arg: SourceArg = "dac:dac-1".parse().expect("arg");
    assert_eq!(arg.resolve(&sources).expect("resolve"), SourceId::new("dac-1"));

    let wrong_kind: SourceArg = "campaign:dac-1".parse().expect("arg");
    assert!(wrong_kind.resolve(&sources).is_err());

    let missing: SourceArg = "dac-9".parse().expect("arg");
    assert!(missing.resolve(&sources).is_err());
}

#[test]
fn owner_prefers_flag_then_settings_then_fixture() {
    let with_flag = Args::parse_from(["delegate", "--fixture", "f.json", "--owner", "0xflag"]);
    let without_flag = Args::parse_from(["delegate", "--fixture", "f.json"]);
    let configured = Settings {
        owner_address: Some("0xsettings".into()),
        ..Settings::default()
    };

    let owner = resolve_owner(&with_flag, &configured, &fixture(Some("0xfixture"))).expect("owner");
    assert_eq!(owner, WalletAddress::new("0xflag"));

    let owner = resolve_owner(&without_flag, &configured, &fixture(Some("0xfixture"))).expect("owner");
    assert_eq!(owner, WalletAddress::new("0xsettings"));

    let owner =
        resolve_owner(&without_flag, &Settings::default(), &fixture(Some("0xfixture"))).expect("owner");
    assert_eq!(owner, WalletAddress::new("0xfixture"));

    assert!(resolve_owner(&without_flag, &Settings::default(), &fixture(None)).is_err());
}

#[test]
fn amount_and_slide_are_mutually_exclusive() {
    let parsed = Args::try_parse_from([
        "delegate", "--fixture", "f.json", "--amount", "1", "--slide", "0.5",
    ]);
    assert!(parsed.is_err());

    let parsed = Args::try_parse_from(["delegate", "--fixture", "f.json", "--slide", "0.555"])
        .expect("slide");
    assert_eq!(parsed.slide, Some(Decimal::new(555, 3)));
}
