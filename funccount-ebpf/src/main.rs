//! # eBPF Kernel-Side Counters
//!
//! Counting programs that run inside the Linux kernel. Userspace attaches the
//! slot program for location `i` to the i-th resolved probe; every hit bumps
//! `COUNTS[i]` on the current CPU.
//!
//! ## Programs
//!
//! - **Kprobe**: `count_kprobe_<i>` - kernel functions
//! - **Uprobe**: `count_uprobe_<i>` - user-space functions and USDT notes
//! - **Tracepoint**: `count_tracepoint_<i>` - kernel tracepoints
//!
//! ## Maps (Shared with Userspace)
//!
//! - `COUNTS` - Per-CPU array, location → calls
//! - `CONFIG` - Runtime configuration (target PID)
//!
//! ## Build
//!
//! Always compiled in release mode (debug includes incompatible formatting code):
//! ```bash
//! cargo xtask build-ebpf
//! ```

#![no_std]
#![no_main]
#![allow(unused_unsafe)]

use aya_ebpf::{
    helpers::bpf_get_current_pid_tgid,
    macros::{kprobe, map, tracepoint, uprobe},
    maps::{HashMap, PerCpuArray},
    programs::{ProbeContext, TracePointContext},
    EbpfContext,
};
use aya_log_ebpf::error;
use funccount_common::{CONFIG_TARGET_PID, MAX_LOCATIONS};

// ============================================================================
// eBPF Maps - Shared data structures between kernel and userspace
// ============================================================================

/// Location → number of calls, one counter per CPU
///
/// Per-CPU slots need no atomics; userspace sums the CPUs when it reads and
/// writes zeroes between reports.
#[map]
static COUNTS: PerCpuArray<u64> = PerCpuArray::with_max_entries(MAX_LOCATIONS, 0);

/// Map: Config key → Config value
///
/// - **Key 0**: Target tgid (0 = count every process)
#[map]
static CONFIG: HashMap<u32, u64> = HashMap::with_max_entries(16, 0);

// ============================================================================
// Counting
// ============================================================================

#[inline(always)]
fn pid_matches() -> bool {
    let target = unsafe { CONFIG.get(&CONFIG_TARGET_PID).copied().unwrap_or(0) };
    if target == 0 {
        return true;
    }
    // The tgid lives in the upper 32 bits
    let tgid = unsafe { bpf_get_current_pid_tgid() } >> 32;
    tgid == target
}

#[inline(always)]
fn count<C: EbpfContext>(ctx: &C, location: u32) -> u32 {
    if !pid_matches() {
        return 0;
    }
    match COUNTS.get_ptr_mut(location) {
        Some(val) => unsafe { *val += 1 },
        None => error!(ctx, "no counter for location {}", location),
    }
    0
}

/// Expands one kprobe, uprobe and tracepoint program per slot.
macro_rules! counting_slots {
    ($($slot:literal => $kprobe:ident, $uprobe:ident, $tracepoint:ident;)*) => {
        $(
            #[kprobe]
            pub fn $kprobe(ctx: ProbeContext) -> u32 {
                count(&ctx, $slot)
            }

            #[uprobe]
            pub fn $uprobe(ctx: ProbeContext) -> u32 {
                count(&ctx, $slot)
            }

            #[tracepoint]
            pub fn $tracepoint(ctx: TracePointContext) -> u32 {
                count(&ctx, $slot)
            }
        )*
    };
}

// Must provide exactly MAX_LOCATIONS slots
counting_slots! {
    0 => count_kprobe_0, count_uprobe_0, count_tracepoint_0;
    1 => count_kprobe_1, count_uprobe_1, count_tracepoint_1;
    2 => count_kprobe_2, count_uprobe_2, count_tracepoint_2;
    3 => count_kprobe_3, count_uprobe_3, count_tracepoint_3;
    4 => count_kprobe_4, count_uprobe_4, count_tracepoint_4;
    5 => count_kprobe_5, count_uprobe_5, count_tracepoint_5;
    6 => count_kprobe_6, count_uprobe_6, count_tracepoint_6;
    7 => count_kprobe_7, count_uprobe_7, count_tracepoint_7;
    8 => count_kprobe_8, count_uprobe_8, count_tracepoint_8;
    9 => count_kprobe_9, count_uprobe_9, count_tracepoint_9;
    10 => count_kprobe_10, count_uprobe_10, count_tracepoint_10;
    11 => count_kprobe_11, count_uprobe_11, count_tracepoint_11;
    12 => count_kprobe_12, count_uprobe_12, count_tracepoint_12;
    13 => count_kprobe_13, count_uprobe_13, count_tracepoint_13;
    14 => count_kprobe_14, count_uprobe_14, count_tracepoint_14;
    15 => count_kprobe_15, count_uprobe_15, count_tracepoint_15;
    16 => count_kprobe_16, count_uprobe_16, count_tracepoint_16;
    17 => count_kprobe_17, count_uprobe_17, count_tracepoint_17;
    18 => count_kprobe_18, count_uprobe_18, count_tracepoint_18;
    19 => count_kprobe_19, count_uprobe_19, count_tracepoint_19;
    20 => count_kprobe_20, count_uprobe_20, count_tracepoint_20;
    21 => count_kprobe_21, count_uprobe_21, count_tracepoint_21;
    22 => count_kprobe_22, count_uprobe_22, count_tracepoint_22;
    23 => count_kprobe_23, count_uprobe_23, count_tracepoint_23;
    24 => count_kprobe_24, count_uprobe_24, count_tracepoint_24;
    25 => count_kprobe_25, count_uprobe_25, count_tracepoint_25;
    26 => count_kprobe_26, count_uprobe_26, count_tracepoint_26;
    27 => count_kprobe_27, count_uprobe_27, count_tracepoint_27;
    28 => count_kprobe_28, count_uprobe_28, count_tracepoint_28;
    29 => count_kprobe_29, count_uprobe_29, count_tracepoint_29;
    30 => count_kprobe_30, count_uprobe_30, count_tracepoint_30;
    31 => count_kprobe_31, count_uprobe_31, count_tracepoint_31;
    32 => count_kprobe_32, count_uprobe_32, count_tracepoint_32;
    33 => count_kprobe_33, count_uprobe_33, count_tracepoint_33;
    34 => count_kprobe_34, count_uprobe_34, count_tracepoint_34;
    35 => count_kprobe_35, count_uprobe_35, count_tracepoint_35;
    36 => count_kprobe_36, count_uprobe_36, count_tracepoint_36;
    37 => count_kprobe_37, count_uprobe_37, count_tracepoint_37;
    38 => count_kprobe_38, count_uprobe_38, count_tracepoint_38;
    39 => count_kprobe_39, count_uprobe_39, count_tracepoint_39;
    40 => count_kprobe_40, count_uprobe_40, count_tracepoint_40;
    41 => count_kprobe_41, count_uprobe_41, count_tracepoint_41;
    42 => count_kprobe_42, count_uprobe_42, count_tracepoint_42;
    43 => count_kprobe_43, count_uprobe_43, count_tracepoint_43;
    44 => count_kprobe_44, count_uprobe_44, count_tracepoint_44;
    45 => count_kprobe_45, count_uprobe_45, count_tracepoint_45;
    46 => count_kprobe_46, count_uprobe_46, count_tracepoint_46;
    47 => count_kprobe_47, count_uprobe_47, count_tracepoint_47;
    48 => count_kprobe_48, count_uprobe_48, count_tracepoint_48;
    49 => count_kprobe_49, count_uprobe_49, count_tracepoint_49;
    50 => count_kprobe_50, count_uprobe_50, count_tracepoint_50;
    51 => count_kprobe_51, count_uprobe_51, count_tracepoint_51;
    52 => count_kprobe_52, count_uprobe_52, count_tracepoint_52;
    53 => count_kprobe_53, count_uprobe_53, count_tracepoint_53;
    54 => count_kprobe_54, count_uprobe_54, count_tracepoint_54;
    55 => count_kprobe_55, count_uprobe_55, count_tracepoint_55;
    56 => count_kprobe_56, count_uprobe_56, count_tracepoint_56;
    57 => count_kprobe_57, count_uprobe_57, count_tracepoint_57;
    58 => count_kprobe_58, count_uprobe_58, count_tracepoint_58;
    59 => count_kprobe_59, count_uprobe_59, count_tracepoint_59;
    60 => count_kprobe_60, count_uprobe_60, count_tracepoint_60;
    61 => count_kprobe_61, count_uprobe_61, count_tracepoint_61;
    62 => count_kprobe_62, count_uprobe_62, count_tracepoint_62;
    63 => count_kprobe_63, count_uprobe_63, count_tracepoint_63;
    64 => count_kprobe_64, count_uprobe_64, count_tracepoint_64;
    65 => count_kprobe_65, count_uprobe_65, count_tracepoint_65;
    66 => count_kprobe_66, count_uprobe_66, count_tracepoint_66;
    67 => count_kprobe_67, count_uprobe_67, count_tracepoint_67;
    68 => count_kprobe_68, count_uprobe_68, count_tracepoint_68;
    69 => count_kprobe_69, count_uprobe_69, count_tracepoint_69;
    70 => count_kprobe_70, count_uprobe_70, count_tracepoint_70;
    71 => count_kprobe_71, count_uprobe_71, count_tracepoint_71;
    72 => count_kprobe_72, count_uprobe_72, count_tracepoint_72;
    73 => count_kprobe_73, count_uprobe_73, count_tracepoint_73;
    74 => count_kprobe_74, count_uprobe_74, count_tracepoint_74;
    75 => count_kprobe_75, count_uprobe_75, count_tracepoint_75;
    76 => count_kprobe_76, count_uprobe_76, count_tracepoint_76;
    77 => count_kprobe_77, count_uprobe_77, count_tracepoint_77;
    78 => count_kprobe_78, count_uprobe_78, count_tracepoint_78;
    79 => count_kprobe_79, count_uprobe_79, count_tracepoint_79;
    80 => count_kprobe_80, count_uprobe_80, count_tracepoint_80;
    81 => count_kprobe_81, count_uprobe_81, count_tracepoint_81;
    82 => count_kprobe_82, count_uprobe_82, count_tracepoint_82;
    83 => count_kprobe_83, count_uprobe_83, count_tracepoint_83;
    84 => count_kprobe_84, count_uprobe_84, count_tracepoint_84;
    85 => count_kprobe_85, count_uprobe_85, count_tracepoint_85;
    86 => count_kprobe_86, count_uprobe_86, count_tracepoint_86;
    87 => count_kprobe_87, count_uprobe_87, count_tracepoint_87;
    88 => count_kprobe_88, count_uprobe_88, count_tracepoint_88;
    89 => count_kprobe_89, count_uprobe_89, count_tracepoint_89;
    90 => count_kprobe_90, count_uprobe_90, count_tracepoint_90;
    91 => count_kprobe_91, count_uprobe_91, count_tracepoint_91;
    92 => count_kprobe_92, count_uprobe_92, count_tracepoint_92;
    93 => count_kprobe_93, count_uprobe_93, count_tracepoint_93;
    94 => count_kprobe_94, count_uprobe_94, count_tracepoint_94;
    95 => count_kprobe_95, count_uprobe_95, count_tracepoint_95;
    96 => count_kprobe_96, count_uprobe_96, count_tracepoint_96;
    97 => count_kprobe_97, count_uprobe_97, count_tracepoint_97;
    98 => count_kprobe_98, count_uprobe_98, count_tracepoint_98;
    99 => count_kprobe_99, count_uprobe_99, count_tracepoint_99;
    100 => count_kprobe_100, count_uprobe_100, count_tracepoint_100;
    101 => count_kprobe_101, count_uprobe_101, count_tracepoint_101;
    102 => count_kprobe_102, count_uprobe_102, count_tracepoint_102;
    103 => count_kprobe_103, count_uprobe_103, count_tracepoint_103;
    104 => count_kprobe_104, count_uprobe_104, count_tracepoint_104;
    105 => count_kprobe_105, count_uprobe_105, count_tracepoint_105;
    106 => count_kprobe_106, count_uprobe_106, count_tracepoint_106;
    107 => count_kprobe_107, count_uprobe_107, count_tracepoint_107;
    108 => count_kprobe_108, count_uprobe_108, count_tracepoint_108;
    109 => count_kprobe_109, count_uprobe_109, count_tracepoint_109;
    110 => count_kprobe_110, count_uprobe_110, count_tracepoint_110;
    111 => count_kprobe_111, count_uprobe_111, count_tracepoint_111;
    112 => count_kprobe_112, count_uprobe_112, count_tracepoint_112;
    113 => count_kprobe_113, count_uprobe_113, count_tracepoint_113;
    114 => count_kprobe_114, count_uprobe_114, count_tracepoint_114;
    115 => count_kprobe_115, count_uprobe_115, count_tracepoint_115;
    116 => count_kprobe_116, count_uprobe_116, count_tracepoint_116;
    117 => count_kprobe_117, count_uprobe_117, count_tracepoint_117;
    118 => count_kprobe_118, count_uprobe_118, count_tracepoint_118;
    119 => count_kprobe_119, count_uprobe_119, count_tracepoint_119;
    120 => count_kprobe_120, count_uprobe_120, count_tracepoint_120;
    121 => count_kprobe_121, count_uprobe_121, count_tracepoint_121;
    122 => count_kprobe_122, count_uprobe_122, count_tracepoint_122;
    123 => count_kprobe_123, count_uprobe_123, count_tracepoint_123;
    124 => count_kprobe_124, count_uprobe_124, count_tracepoint_124;
    125 => count_kprobe_125, count_uprobe_125, count_tracepoint_125;
    126 => count_kprobe_126, count_uprobe_126, count_tracepoint_126;
    127 => count_kprobe_127, count_uprobe_127, count_tracepoint_127;
    128 => count_kprobe_128, count_uprobe_128, count_tracepoint_128;
    129 => count_kprobe_129, count_uprobe_129, count_tracepoint_129;
    130 => count_kprobe_130, count_uprobe_130, count_tracepoint_130;
    131 => count_kprobe_131, count_uprobe_131, count_tracepoint_131;
    132 => count_kprobe_132, count_uprobe_132, count_tracepoint_132;
    133 => count_kprobe_133, count_uprobe_133, count_tracepoint_133;
    134 => count_kprobe_134, count_uprobe_134, count_tracepoint_134;
    135 => count_kprobe_135, count_uprobe_135, count_tracepoint_135;
    136 => count_kprobe_136, count_uprobe_136, count_tracepoint_136;
    137 => count_kprobe_137, count_uprobe_137, count_tracepoint_137;
    138 => count_kprobe_138, count_uprobe_138, count_tracepoint_138;
    139 => count_kprobe_139, count_uprobe_139, count_tracepoint_139;
    140 => count_kprobe_140, count_uprobe_140, count_tracepoint_140;
    141 => count_kprobe_141, count_uprobe_141, count_tracepoint_141;
    142 => count_kprobe_142, count_uprobe_142, count_tracepoint_142;
    143 => count_kprobe_143, count_uprobe_143, count_tracepoint_143;
    144 => count_kprobe_144, count_uprobe_144, count_tracepoint_144;
    145 => count_kprobe_145, count_uprobe_145, count_tracepoint_145;
    146 => count_kprobe_146, count_uprobe_146, count_tracepoint_146;
    147 => count_kprobe_147, count_uprobe_147, count_tracepoint_147;
    148 => count_kprobe_148, count_uprobe_148, count_tracepoint_148;
    149 => count_kprobe_149, count_uprobe_149, count_tracepoint_149;
    150 => count_kprobe_150, count_uprobe_150, count_tracepoint_150;
    151 => count_kprobe_151, count_uprobe_151, count_tracepoint_151;
    152 => count_kprobe_152, count_uprobe_152, count_tracepoint_152;
    153 => count_kprobe_153, count_uprobe_153, count_tracepoint_153;
    154 => count_kprobe_154, count_uprobe_154, count_tracepoint_154;
    155 => count_kprobe_155, count_uprobe_155, count_tracepoint_155;
    156 => count_kprobe_156, count_uprobe_156, count_tracepoint_156;
    157 => count_kprobe_157, count_uprobe_157, count_tracepoint_157;
    158 => count_kprobe_158, count_uprobe_158, count_tracepoint_158;
    159 => count_kprobe_159, count_uprobe_159, count_tracepoint_159;
    160 => count_kprobe_160, count_uprobe_160, count_tracepoint_160;
    161 => count_kprobe_161, count_uprobe_161, count_tracepoint_161;
    162 => count_kprobe_162, count_uprobe_162, count_tracepoint_162;
    163 => count_kprobe_163, count_uprobe_163, count_tracepoint_163;
    164 => count_kprobe_164, count_uprobe_164, count_tracepoint_164;
    165 => count_kprobe_165, count_uprobe_165, count_tracepoint_165;
    166 => count_kprobe_166, count_uprobe_166, count_tracepoint_166;
    167 => count_kprobe_167, count_uprobe_167, count_tracepoint_167;
    168 => count_kprobe_168, count_uprobe_168, count_tracepoint_168;
    169 => count_kprobe_169, count_uprobe_169, count_tracepoint_169;
    170 => count_kprobe_170, count_uprobe_170, count_tracepoint_170;
    171 => count_kprobe_171, count_uprobe_171, count_tracepoint_171;
    172 => count_kprobe_172, count_uprobe_172, count_tracepoint_172;
    173 => count_kprobe_173, count_uprobe_173, count_tracepoint_173;
    174 => count_kprobe_174, count_uprobe_174, count_tracepoint_174;
    175 => count_kprobe_175, count_uprobe_175, count_tracepoint_175;
    176 => count_kprobe_176, count_uprobe_176, count_tracepoint_176;
    177 => count_kprobe_177, count_uprobe_177, count_tracepoint_177;
    178 => count_kprobe_178, count_uprobe_178, count_tracepoint_178;
    179 => count_kprobe_179, count_uprobe_179, count_tracepoint_179;
    180 => count_kprobe_180, count_uprobe_180, count_tracepoint_180;
    181 => count_kprobe_181, count_uprobe_181, count_tracepoint_181;
    182 => count_kprobe_182, count_uprobe_182, count_tracepoint_182;
    183 => count_kprobe_183, count_uprobe_183, count_tracepoint_183;
    184 => count_kprobe_184, count_uprobe_184, count_tracepoint_184;
    185 => count_kprobe_185, count_uprobe_185, count_tracepoint_185;
    186 => count_kprobe_186, count_uprobe_186, count_tracepoint_186;
    187 => count_kprobe_187, count_uprobe_187, count_tracepoint_187;
    188 => count_kprobe_188, count_uprobe_188, count_tracepoint_188;
    189 => count_kprobe_189, count_uprobe_189, count_tracepoint_189;
    190 => count_kprobe_190, count_uprobe_190, count_tracepoint_190;
    191 => count_kprobe_191, count_uprobe_191, count_tracepoint_191;
    192 => count_kprobe_192, count_uprobe_192, count_tracepoint_192;
    193 => count_kprobe_193, count_uprobe_193, count_tracepoint_193;
    194 => count_kprobe_194, count_uprobe_194, count_tracepoint_194;
    195 => count_kprobe_195, count_uprobe_195, count_tracepoint_195;
    196 => count_kprobe_196, count_uprobe_196, count_tracepoint_196;
    197 => count_kprobe_197, count_uprobe_197, count_tracepoint_197;
    198 => count_kprobe_198, count_uprobe_198, count_tracepoint_198;
    199 => count_kprobe_199, count_uprobe_199, count_tracepoint_199;
    200 => count_kprobe_200, count_uprobe_200, count_tracepoint_200;
    201 => count_kprobe_201, count_uprobe_201, count_tracepoint_201;
    202 => count_kprobe_202, count_uprobe_202, count_tracepoint_202;
    203 => count_kprobe_203, count_uprobe_203, count_tracepoint_203;
    204 => count_kprobe_204, count_uprobe_204, count_tracepoint_204;
    205 => count_kprobe_205, count_uprobe_205, count_tracepoint_205;
    206 => count_kprobe_206, count_uprobe_206, count_tracepoint_206;
    207 => count_kprobe_207, count_uprobe_207, count_tracepoint_207;
    208 => count_kprobe_208, count_uprobe_208, count_tracepoint_208;
    209 => count_kprobe_209, count_uprobe_209, count_tracepoint_209;
    210 => count_kprobe_210, count_uprobe_210, count_tracepoint_210;
    211 => count_kprobe_211, count_uprobe_211, count_tracepoint_211;
    212 => count_kprobe_212, count_uprobe_212, count_tracepoint_212;
    213 => count_kprobe_213, count_uprobe_213, count_tracepoint_213;
    214 => count_kprobe_214, count_uprobe_214, count_tracepoint_214;
    215 => count_kprobe_215, count_uprobe_215, count_tracepoint_215;
    216 => count_kprobe_216, count_uprobe_216, count_tracepoint_216;
    217 => count_kprobe_217, count_uprobe_217, count_tracepoint_217;
    218 => count_kprobe_218, count_uprobe_218, count_tracepoint_218;
    219 => count_kprobe_219, count_uprobe_219, count_tracepoint_219;
    220 => count_kprobe_220, count_uprobe_220, count_tracepoint_220;
    221 => count_kprobe_221, count_uprobe_221, count_tracepoint_221;
    222 => count_kprobe_222, count_uprobe_222, count_tracepoint_222;
    223 => count_kprobe_223, count_uprobe_223, count_tracepoint_223;
    224 => count_kprobe_224, count_uprobe_224, count_tracepoint_224;
    225 => count_kprobe_225, count_uprobe_225, count_tracepoint_225;
    226 => count_kprobe_226, count_uprobe_226, count_tracepoint_226;
    227 => count_kprobe_227, count_uprobe_227, count_tracepoint_227;
    228 => count_kprobe_228, count_uprobe_228, count_tracepoint_228;
    229 => count_kprobe_229, count_uprobe_229, count_tracepoint_229;
    230 => count_kprobe_230, count_uprobe_230, count_tracepoint_230;
    231 => count_kprobe_231, count_uprobe_231, count_tracepoint_231;
    232 => count_kprobe_232, count_uprobe_232, count_tracepoint_232;
    233 => count_kprobe_233, count_uprobe_233, count_tracepoint_233;
    234 => count_kprobe_234, count_uprobe_234, count_tracepoint_234;
    235 => count_kprobe_235, count_uprobe_235, count_tracepoint_235;
    236 => count_kprobe_236, count_uprobe_236, count_tracepoint_236;
    237 => count_kprobe_237, count_uprobe_237, count_tracepoint_237;
    238 => count_kprobe_238, count_uprobe_238, count_tracepoint_238;
    239 => count_kprobe_239, count_uprobe_239, count_tracepoint_239;
    240 => count_kprobe_240, count_uprobe_240, count_tracepoint_240;
    241 => count_kprobe_241, count_uprobe_241, count_tracepoint_241;
    242 => count_kprobe_242, count_uprobe_242, count_tracepoint_242;
    243 => count_kprobe_243, count_uprobe_243, count_tracepoint_243;
    244 => count_kprobe_244, count_uprobe_244, count_tracepoint_244;
    245 => count_kprobe_245, count_uprobe_245, count_tracepoint_245;
    246 => count_kprobe_246, count_uprobe_246, count_tracepoint_246;
    247 => count_kprobe_247, count_uprobe_247, count_tracepoint_247;
    248 => count_kprobe_248, count_uprobe_248, count_tracepoint_248;
    249 => count_kprobe_249, count_uprobe_249, count_tracepoint_249;
    250 => count_kprobe_250, count_uprobe_250, count_tracepoint_250;
    251 => count_kprobe_251, count_uprobe_251, count_tracepoint_251;
    252 => count_kprobe_252, count_uprobe_252, count_tracepoint_252;
    253 => count_kprobe_253, count_uprobe_253, count_tracepoint_253;
    254 => count_kprobe_254, count_uprobe_254, count_tracepoint_254;
    255 => count_kprobe_255, count_uprobe_255, count_tracepoint_255;
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    unsafe { core::hint::unreachable_unchecked() }
}
