// 构建脚本: 生成COCO类别静态表 + 链接FFmpeg依赖库
use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

// COCO-80 类别名 (YOLOv8检测模型输出顺序)
const COCO_NAMES: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

// 车辆类别: bicycle, car, motorcycle, bus, truck
const VEHICLE_IDS: [u32; 5] = [1, 2, 3, 5, 7];

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_path = Path::new(&env::var("OUT_DIR").unwrap()).join("coco_tables.rs");
    let mut out = BufWriter::new(File::create(&out_path).unwrap());

    let name_literals: Vec<String> = COCO_NAMES.iter().map(|name| format!("{:?}", name)).collect();
    let mut names = phf_codegen::Map::new();
    for (id, literal) in name_literals.iter().enumerate() {
        names.entry(id as u32, literal);
    }
    writeln!(
        &mut out,
        "pub static COCO_NAMES: phf::Map<u32, &'static str> = {};",
        names.build()
    )
    .unwrap();

    let mut vehicles = phf_codegen::Set::new();
    for id in VEHICLE_IDS {
        vehicles.entry(id);
    }
    writeln!(
        &mut out,
        "pub static VEHICLE_CLASS_IDS: phf::Set<u32> = {};",
        vehicles.build()
    )
    .unwrap();

    // 仅在Windows MSVC环境下添加FFmpeg相关库 (video feature)
    #[cfg(all(target_os = "windows", target_env = "msvc"))]
    if env::var("CARGO_FEATURE_VIDEO").is_ok() {
        // Intel QSV (Quick Sync Video) 硬件加速
        println!("cargo:rustc-link-lib=dylib=libmfx");

        // x264 编码器
        println!("cargo:rustc-link-lib=dylib=libx264");

        // OLE 自动化和VFW
        println!("cargo:rustc-link-lib=dylib=oleaut32");
        println!("cargo:rustc-link-lib=dylib=vfw32");

        // Secure Channel (TLS/SSL)
        println!("cargo:rustc-link-lib=dylib=secur32");
    }
}
